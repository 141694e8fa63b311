//! Global configuration types for Ledgerflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! server, database location, workflow thresholds, capability pools and
//! provider selection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::PoolConfig;

/// Top-level configuration.
///
/// Loaded from `~/.ledgerflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub router: RouterConfig,

    /// Capability pools keyed by pool name (e.g. "common", "atlas").
    #[serde(default)]
    pub pools: HashMap<String, PoolConfig>,

    #[serde(default)]
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Overrides the default `sqlite://{data_dir}/ledgerflow.db` location.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Minimum two-way match score that skips human review.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Prefix for review ticket locators; the ticket id is appended.
    #[serde(default = "default_review_base_url")]
    pub review_base_url: String,
}

fn default_match_threshold() -> f64 {
    0.90
}

fn default_review_base_url() -> String {
    "http://localhost:8080/review".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            review_base_url: default_review_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Upper bound for one capability call, handshake included.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Client name announced in the worker handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_client_name() -> String {
    "ledgerflow".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            client_name: default_client_name(),
        }
    }
}

/// Ordered candidate providers per capability. The first entry is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_ocr")]
    pub ocr: Vec<String>,
    #[serde(default = "default_enrichment")]
    pub enrichment: Vec<String>,
    #[serde(default = "default_erp_connector")]
    pub erp_connector: Vec<String>,
    #[serde(default = "default_email")]
    pub email: Vec<String>,
}

fn default_ocr() -> Vec<String> {
    vec!["google_vision".to_string(), "tesseract".to_string(), "aws_textract".to_string()]
}

fn default_enrichment() -> Vec<String> {
    vec!["clearbit".to_string(), "people_data_labs".to_string(), "vendor_db".to_string()]
}

fn default_erp_connector() -> Vec<String> {
    vec!["mock_erp".to_string(), "sap_sandbox".to_string(), "netsuite".to_string()]
}

fn default_email() -> Vec<String> {
    vec!["sendgrid".to_string(), "ses".to_string(), "smartlead".to_string()]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ocr: default_ocr(),
            enrichment: default_enrichment(),
            erp_connector: default_erp_connector(),
            email: default_email(),
        }
    }
}

impl ProviderConfig {
    pub fn ocr(&self) -> Option<&str> {
        first(&self.ocr)
    }

    pub fn enrichment(&self) -> Option<&str> {
        first(&self.enrichment)
    }

    pub fn erp_connector(&self) -> Option<&str> {
        first(&self.erp_connector)
    }

    pub fn email(&self) -> Option<&str> {
        first(&self.email)
    }
}

fn first(list: &[String]) -> Option<&str> {
    list.first().map(String::as_str)
}
