//! Invoice workflow payloads and state.
//!
//! [`InvoiceState`] is the state carried between invoice workflow stages.
//! Every field is optional so a stage can return a partial update holding
//! only the fields it produced.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::review::Decision;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// An invoice as submitted for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSubmission {
    pub invoice_id: String,
    pub vendor_name: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl InvoiceSubmission {
    /// Reject payloads no stage could process.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.invoice_id.trim().is_empty() {
            return Err(ValidationError::new("invoice_id", "must not be empty"));
        }
        if self.vendor_name.trim().is_empty() {
            return Err(ValidationError::new("vendor_name", "must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(ValidationError::new("amount", "must be a non-negative number"));
        }
        if self.currency.trim().len() != 3 {
            return Err(ValidationError::new("currency", "must be a 3-letter code"));
        }
        Ok(())
    }

    /// First attachment, which is the document sent to OCR.
    pub fn primary_attachment(&self) -> &str {
        self.attachments
            .first()
            .map(String::as_str)
            .unwrap_or("unknown_file.pdf")
    }
}

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchResult {
    Matched,
    Failed,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Matched => write!(f, "MATCHED"),
            MatchResult::Failed => write!(f, "FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Workflow state for one invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceSubmission>,
    /// Last stage that completed, e.g. `INTAKE_COMPLETE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_invoice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_provider: Option<String>,

    /// Normalized vendor name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_profile: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_flags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_pos: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_grns: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_result: Option<MatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounting_entries: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_txn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
}

impl InvoiceState {
    /// Initial state for a new submission.
    pub fn from_submission(invoice: InvoiceSubmission) -> Self {
        Self {
            invoice: Some(invoice),
            stage: Some("SUBMITTED".to_string()),
            ..Self::default()
        }
    }

    pub fn invoice_id(&self) -> &str {
        self.invoice
            .as_ref()
            .map(|i| i.invoice_id.as_str())
            .unwrap_or("UNKNOWN")
    }

    pub fn amount(&self) -> f64 {
        self.invoice.as_ref().map(|i| i.amount).unwrap_or(0.0)
    }

    pub fn currency(&self) -> &str {
        self.invoice
            .as_ref()
            .map(|i| i.currency.as_str())
            .unwrap_or("USD")
    }

    /// Normalized vendor name, falling back to the submitted one.
    pub fn effective_vendor_name(&self) -> &str {
        self.vendor_name
            .as_deref()
            .or_else(|| self.invoice.as_ref().map(|i| i.vendor_name.as_str()))
            .unwrap_or("UNKNOWN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> InvoiceSubmission {
        InvoiceSubmission {
            invoice_id: "INV-1".to_string(),
            vendor_name: "Acme Corp".to_string(),
            amount: 1000.0,
            currency: "USD".to_string(),
            attachments: vec!["inv-1.pdf".to_string()],
        }
    }

    #[test]
    fn test_submission_validate_ok() {
        assert!(submission().validate().is_ok());
    }

    #[test]
    fn test_submission_validate_rejects_bad_fields() {
        let mut s = submission();
        s.invoice_id = "  ".to_string();
        assert_eq!(s.validate().unwrap_err().field, "invoice_id");

        let mut s = submission();
        s.amount = -5.0;
        assert_eq!(s.validate().unwrap_err().field, "amount");

        let mut s = submission();
        s.amount = f64::NAN;
        assert_eq!(s.validate().unwrap_err().field, "amount");
    }

    #[test]
    fn test_submission_currency_defaults_to_usd() {
        let s: InvoiceSubmission = serde_json::from_value(json!({
            "invoice_id": "INV-2",
            "vendor_name": "Globex",
            "amount": 10.5
        }))
        .unwrap();
        assert_eq!(s.currency, "USD");
        assert!(s.attachments.is_empty());
        assert_eq!(s.primary_attachment(), "unknown_file.pdf");
    }

    #[test]
    fn test_state_serializes_only_present_fields() {
        let state = InvoiceState {
            match_score: Some(0.5),
            ..InvoiceState::default()
        };
        let v = serde_json::to_value(&state).unwrap();
        assert_eq!(v, json!({"match_score": 0.5}));
    }

    #[test]
    fn test_effective_vendor_name_prefers_normalized() {
        let mut state = InvoiceState::from_submission(submission());
        assert_eq!(state.effective_vendor_name(), "Acme Corp");
        state.vendor_name = Some("ACME CORPORATION".to_string());
        assert_eq!(state.effective_vendor_name(), "ACME CORPORATION");
        assert_eq!(state.invoice_id(), "INV-1");
    }
}
