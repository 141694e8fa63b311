//! Invoice workflow stages.
//!
//! Each [`Stage`] is one graph node. Stages reach workers only through the
//! capability router and return a partial [`InvoiceState`] holding the fields
//! they produced. Calls marked as degradable log a warning and continue with
//! an empty result; every other capability failure fails the node.

use std::sync::Arc;

use ledgerflow_types::capability::ToolOutcome;
use ledgerflow_types::config::{GlobalConfig, ProviderConfig};
use ledgerflow_types::invoice::{InvoiceState, InvoiceSubmission, MatchResult};
use ledgerflow_types::review::Decision;
use serde_json::{Map, Value, json};

use super::{ATLAS_POOL, COMMON_POOL};
use crate::capability::BoxCapabilityRouter;
use crate::graph::{Node, NodeContext, NodeError, NodeFuture};

const FINANCE_RECIPIENT: &str = "accounts.payable@ledgerflow.local";
const VENDOR_FALLBACK_RECIPIENT: &str = "vendor.contact@example.com";
const DEFAULT_PROVIDER: &str = "default";

const HUMAN_APPROVER: &str = "Human Reviewer";
const POLICY_APPROVER: &str = "Auto-Approval Policy";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Intake,
    Understand,
    Prepare,
    Retrieve,
    MatchTwoWay,
    CheckpointHitl,
    HitlDecision,
    Reconcile,
    Approve,
    Posting,
    Notify,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Intake,
        Stage::Understand,
        Stage::Prepare,
        Stage::Retrieve,
        Stage::MatchTwoWay,
        Stage::CheckpointHitl,
        Stage::HitlDecision,
        Stage::Reconcile,
        Stage::Approve,
        Stage::Posting,
        Stage::Notify,
        Stage::Complete,
    ];

    /// Node name in the graph.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Understand => "understand",
            Stage::Prepare => "prepare",
            Stage::Retrieve => "retrieve",
            Stage::MatchTwoWay => "match_two_way",
            Stage::CheckpointHitl => "checkpoint_hitl",
            Stage::HitlDecision => "hitl_decision",
            Stage::Reconcile => "reconcile",
            Stage::Approve => "approve",
            Stage::Posting => "posting",
            Stage::Notify => "notify",
            Stage::Complete => "complete",
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables read by the stages.
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Match scores at or above this go straight to reconciliation.
    pub match_threshold: f64,
    pub providers: ProviderConfig,
}

impl StageSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            match_threshold: config.workflow.match_threshold,
            providers: config.providers.clone(),
        }
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Stage implementations
// ---------------------------------------------------------------------------

pub struct InvoiceStages {
    router: Arc<BoxCapabilityRouter>,
    settings: StageSettings,
}

impl InvoiceStages {
    pub fn new(router: Arc<BoxCapabilityRouter>, settings: StageSettings) -> Self {
        Self { router, settings }
    }

    pub async fn run(
        &self,
        stage: Stage,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        match stage {
            Stage::Intake => self.intake(state).await,
            Stage::Understand => self.understand(ctx, state).await,
            Stage::Prepare => self.prepare(ctx, state).await,
            Stage::Retrieve => self.retrieve(ctx, state).await,
            Stage::MatchTwoWay => self.match_two_way(ctx, state).await,
            Stage::CheckpointHitl => Ok(self.checkpoint_hitl(state)),
            Stage::HitlDecision => self.hitl_decision(ctx, state).await,
            Stage::Reconcile => self.reconcile(state).await,
            Stage::Approve => Ok(approve(state)),
            Stage::Posting => self.posting(ctx, state).await,
            Stage::Notify => self.notify(ctx, state).await,
            Stage::Complete => self.complete(ctx, state).await,
        }
    }

    async fn intake(&self, state: &InvoiceState) -> Result<InvoiceState, NodeError> {
        let invoice = submitted(state)?;
        let payload = self
            .require(
                COMMON_POOL,
                "accept_invoice_payload",
                json!({ "invoice_data": invoice }),
            )
            .await?;
        let raw_id = str_field(&payload, "raw_id").ok_or_else(|| {
            NodeError::Failed("accept_invoice_payload returned no raw_id".to_string())
        })?;

        Ok(InvoiceState {
            stage: Some("INTAKE_COMPLETE".to_string()),
            raw_id: Some(raw_id),
            ..InvoiceState::default()
        })
    }

    async fn understand(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let invoice = submitted(state)?;
        let provider = self.settings.providers.ocr().unwrap_or(DEFAULT_PROVIDER);

        let ocr = self
            .require(
                ATLAS_POOL,
                "ocr_extract",
                json!({ "file_path": invoice.primary_attachment(), "provider": provider }),
            )
            .await?;
        let raw_text = ocr.get("text").cloned().unwrap_or(ocr);

        let parsed = self
            .require(
                COMMON_POOL,
                "parse_line_items",
                json!({ "raw_text": raw_text }),
            )
            .await?;
        let parsed_data = parsed
            .get("parsed_data")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let po_number = str_field(&parsed_data, "po_number");

        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            provider,
            po_number = po_number.as_deref().unwrap_or("-"),
            "document understood"
        );

        Ok(InvoiceState {
            stage: Some("UNDERSTOOD".to_string()),
            parsed_invoice: Some(parsed_data),
            po_number,
            ocr_provider: Some(provider.to_string()),
            ..InvoiceState::default()
        })
    }

    async fn prepare(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let raw_vendor = state
            .parsed_invoice
            .as_ref()
            .and_then(|p| str_field(p, "vendor_name"))
            .unwrap_or_else(|| state.effective_vendor_name().to_string());

        let normalized = self
            .require(
                COMMON_POOL,
                "normalize_vendor",
                json!({ "raw_name": raw_vendor }),
            )
            .await?;
        let vendor_name = str_field(&normalized, "normalized_name").unwrap_or(raw_vendor);

        let source = self
            .settings
            .providers
            .enrichment()
            .unwrap_or(DEFAULT_PROVIDER);
        let vendor_data = self
            .degrade(
                ctx,
                ATLAS_POOL,
                "enrich_vendor",
                json!({ "normalized_name": vendor_name, "source": source }),
            )
            .await
            .and_then(|p| p.get("vendor_data").cloned())
            .unwrap_or_else(|| json!({}));

        let flags = self
            .require(
                COMMON_POOL,
                "compute_flags",
                json!({ "enrichment_data": vendor_data, "invoice_amount": state.amount() }),
            )
            .await?;
        let validation_flags: Vec<String> = list_field(&flags, "flags")
            .iter()
            .filter_map(|f| f.as_str().map(str::to_string))
            .collect();
        if !validation_flags.is_empty() {
            tracing::info!(
                thread_id = ctx.thread_id.as_str(),
                flags = ?validation_flags,
                "validation flags raised"
            );
        }

        let mut profile = Map::new();
        profile.insert("name".to_string(), json!(vendor_name));
        if let Value::Object(extra) = vendor_data {
            profile.extend(extra);
        }

        Ok(InvoiceState {
            stage: Some("PREPARED".to_string()),
            vendor_name: Some(vendor_name),
            vendor_profile: Some(Value::Object(profile)),
            validation_flags: Some(validation_flags),
            ..InvoiceState::default()
        })
    }

    async fn retrieve(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let erp_system = self
            .settings
            .providers
            .erp_connector()
            .unwrap_or(DEFAULT_PROVIDER);
        let data = self
            .degrade(
                ctx,
                ATLAS_POOL,
                "fetch_erp_data",
                json!({
                    "vendor_name": state.effective_vendor_name(),
                    "po_number": state.po_number.as_deref().unwrap_or(""),
                    "erp_system": erp_system,
                }),
            )
            .await
            .and_then(|p| p.get("data").cloned())
            .unwrap_or_else(|| json!({}));

        let pos = list_field(&data, "purchase_orders");
        let grns = list_field(&data, "grns");
        let history = list_field(&data, "history");

        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            purchase_orders = pos.len(),
            grns = grns.len(),
            history = history.len(),
            "erp data retrieved"
        );

        Ok(InvoiceState {
            stage: Some("RETRIEVED".to_string()),
            matched_pos: Some(pos),
            matched_grns: Some(grns),
            history: Some(history),
            ..InvoiceState::default()
        })
    }

    async fn match_two_way(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let mut invoice_data = state.parsed_invoice.clone().unwrap_or_else(|| json!({}));
        if invoice_data.get("total_amount").and_then(Value::as_f64).is_none() {
            if let Some(obj) = invoice_data.as_object_mut() {
                obj.insert("total_amount".to_string(), json!(state.amount()));
            }
        }

        let po_number = str_field(&invoice_data, "po_number").or_else(|| state.po_number.clone());
        let pos = state.matched_pos.as_deref().unwrap_or(&[]);
        let po_data = po_number
            .as_deref()
            .and_then(|n| {
                pos.iter()
                    .find(|po| po.get("po_number").and_then(Value::as_str) == Some(n))
            })
            .or_else(|| pos.first())
            .cloned()
            .unwrap_or_else(|| json!({}));

        let outcome = self
            .router
            .invoke(
                COMMON_POOL,
                "compute_match_score",
                json!({ "invoice_data": invoice_data, "po_data": po_data }),
            )
            .await;
        let (score, notes) = match outcome {
            ToolOutcome::Success { payload } => (
                payload.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                str_field(&payload, "notes").unwrap_or_default(),
            ),
            // A scorer that ran and refused is a failing match, not a fault.
            ToolOutcome::ApplicationError { message } => {
                tracing::warn!(
                    thread_id = ctx.thread_id.as_str(),
                    error = message.as_str(),
                    "match scorer reported an error, scoring 0"
                );
                (0.0, message)
            }
            ToolOutcome::TransportError { message } => {
                return Err(NodeError::Capability {
                    operation: "compute_match_score".to_string(),
                    message,
                });
            }
        };

        let result = if score >= self.settings.match_threshold {
            MatchResult::Matched
        } else {
            MatchResult::Failed
        };
        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            score,
            threshold = self.settings.match_threshold,
            result = %result,
            "two-way match scored"
        );

        Ok(InvoiceState {
            stage: Some(format!("MATCH_{result}")),
            match_score: Some(score),
            match_result: Some(result),
            match_notes: Some(notes),
            ..InvoiceState::default()
        })
    }

    fn checkpoint_hitl(&self, state: &InvoiceState) -> InvoiceState {
        InvoiceState {
            stage: Some("AWAITING_REVIEW".to_string()),
            hold_reason: Some(format!(
                "Match score {:.2} below threshold {:.2}",
                state.match_score.unwrap_or(0.0),
                self.settings.match_threshold
            )),
            ..InvoiceState::default()
        }
    }

    async fn hitl_decision(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let decision = state
            .human_decision
            .ok_or_else(|| NodeError::MissingInput("human_decision".to_string()))?;

        self.degrade(
            ctx,
            ATLAS_POOL,
            "accept_or_reject_invoice",
            json!({
                "invoice_id": state.invoice_id(),
                "decision": decision,
                "notes": state.reviewer_notes.as_deref().unwrap_or(""),
                "reviewer": "human_reviewer",
            }),
        )
        .await;

        let stage = match decision {
            Decision::Accept => "APPROVED_BY_HUMAN",
            Decision::Reject => "REQUIRES_MANUAL_HANDLING",
        };
        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            decision = %decision,
            "human decision applied"
        );

        Ok(InvoiceState {
            stage: Some(stage.to_string()),
            ..InvoiceState::default()
        })
    }

    async fn reconcile(&self, state: &InvoiceState) -> Result<InvoiceState, NodeError> {
        let parsed = state.parsed_invoice.clone().unwrap_or_else(|| json!({}));
        let invoice_data = json!({
            "invoice_id": str_field(&parsed, "invoice_id")
                .unwrap_or_else(|| state.invoice_id().to_string()),
            "total_amount": parsed
                .get("total_amount")
                .and_then(Value::as_f64)
                .unwrap_or(state.amount()),
            "currency": str_field(&parsed, "currency")
                .unwrap_or_else(|| state.currency().to_string()),
            "line_items": parsed.get("line_items").cloned().unwrap_or_else(|| json!([])),
        });

        let payload = self
            .require(
                COMMON_POOL,
                "build_accounting_entries",
                json!({
                    "invoice_data": invoice_data,
                    "vendor_name": state.effective_vendor_name(),
                }),
            )
            .await?;

        Ok(InvoiceState {
            stage: Some("RECONCILED".to_string()),
            accounting_entries: Some(list_field(&payload, "entries")),
            ..InvoiceState::default()
        })
    }

    async fn posting(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let entries = state.accounting_entries.as_deref().unwrap_or(&[]);
        if entries.is_empty() {
            return Err(NodeError::MissingInput("accounting_entries".to_string()));
        }

        // Workers deduplicate on this key if the step is replayed after a crash.
        let key = ctx.idempotency_key();
        let erp_system = self
            .settings
            .providers
            .erp_connector()
            .unwrap_or(DEFAULT_PROVIDER);

        let posted = self
            .require(
                ATLAS_POOL,
                "post_to_erp",
                json!({ "entries": entries, "erp_system": erp_system, "idempotency_key": key }),
            )
            .await?;
        let txn_id = str_field(&posted, "txn_id")
            .ok_or_else(|| NodeError::Failed("post_to_erp returned no txn_id".to_string()))?;

        let due_date = state
            .parsed_invoice
            .as_ref()
            .and_then(|p| p.pointer("/parsed_dates/due_date"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let scheduled = self
            .require(
                ATLAS_POOL,
                "schedule_payment",
                json!({
                    "invoice_id": state.invoice_id(),
                    "amount": state.amount(),
                    "currency": state.currency(),
                    "vendor": state.effective_vendor_name(),
                    "due_date": due_date,
                    "idempotency_key": key,
                }),
            )
            .await?;
        let payment_id = str_field(&scheduled, "payment_id").ok_or_else(|| {
            NodeError::Failed("schedule_payment returned no payment_id".to_string())
        })?;

        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            txn_id = txn_id.as_str(),
            payment_id = payment_id.as_str(),
            "posted to erp"
        );

        Ok(InvoiceState {
            stage: Some("POSTED".to_string()),
            erp_txn_id: Some(txn_id),
            payment_id: Some(payment_id),
            ..InvoiceState::default()
        })
    }

    async fn notify(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let provider = self.settings.providers.email().unwrap_or(DEFAULT_PROVIDER);
        let invoice_id = state.invoice_id();
        let vendor = state.effective_vendor_name();
        let vendor_email = state
            .vendor_profile
            .as_ref()
            .and_then(|p| str_field(p, "email"))
            .unwrap_or_else(|| VENDOR_FALLBACK_RECIPIENT.to_string());
        let payment_id = state.payment_id.as_deref().unwrap_or("PENDING");
        let approver = state.approver.as_deref().unwrap_or(POLICY_APPROVER);

        let vendor_sent = self
            .degrade(
                ctx,
                ATLAS_POOL,
                "send_notification",
                json!({
                    "recipient": vendor_email,
                    "subject": format!("Payment scheduled: invoice {invoice_id}"),
                    "body": format!(
                        "Dear {vendor},\n\nWe have approved your invoice for {:.2} {}. Payment ID: {payment_id}.",
                        state.amount(),
                        state.currency()
                    ),
                    "channel": "email",
                    "provider": provider,
                }),
            )
            .await
            .is_some();

        let finance_sent = self
            .degrade(
                ctx,
                ATLAS_POOL,
                "send_notification",
                json!({
                    "recipient": FINANCE_RECIPIENT,
                    "subject": format!("Processed: {vendor} - {invoice_id}"),
                    "body": format!(
                        "Invoice {invoice_id} posted to ERP.\nApprover: {approver}\nTXN ID: {}",
                        state.erp_txn_id.as_deref().unwrap_or("-")
                    ),
                    "channel": "slack",
                    "provider": "slack_webhook",
                }),
            )
            .await
            .is_some();

        Ok(InvoiceState {
            stage: Some("NOTIFIED".to_string()),
            notified: Some(vendor_sent && finance_sent),
            ..InvoiceState::default()
        })
    }

    async fn complete(
        &self,
        ctx: &NodeContext,
        state: &InvoiceState,
    ) -> Result<InvoiceState, NodeError> {
        let mut snapshot =
            serde_json::to_value(state).map_err(|e| NodeError::Failed(e.to_string()))?;
        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("thread_id".to_string(), json!(ctx.thread_id));
        }

        self.degrade(
            ctx,
            COMMON_POOL,
            "output_final_payload",
            json!({ "workflow_state": snapshot }),
        )
        .await;

        tracing::info!(
            thread_id = ctx.thread_id.as_str(),
            invoice_id = state.invoice_id(),
            "invoice workflow complete"
        );

        Ok(InvoiceState {
            stage: Some("COMPLETED".to_string()),
            ..InvoiceState::default()
        })
    }

    /// Call an operation whose failure fails the node.
    async fn require(
        &self,
        pool: &str,
        operation: &str,
        arguments: Value,
    ) -> Result<Value, NodeError> {
        match self.router.invoke(pool, operation, arguments).await {
            ToolOutcome::Success { payload } => Ok(payload),
            ToolOutcome::ApplicationError { message } | ToolOutcome::TransportError { message } => {
                Err(NodeError::Capability {
                    operation: operation.to_string(),
                    message,
                })
            }
        }
    }

    /// Call an operation whose failure is tolerated. Returns `None` on failure.
    async fn degrade(
        &self,
        ctx: &NodeContext,
        pool: &str,
        operation: &str,
        arguments: Value,
    ) -> Option<Value> {
        match self.router.invoke(pool, operation, arguments).await {
            ToolOutcome::Success { payload } => Some(payload),
            other => {
                tracing::warn!(
                    thread_id = ctx.thread_id.as_str(),
                    node = ctx.node.as_str(),
                    pool,
                    operation,
                    error = other.error_message().unwrap_or_default(),
                    "capability failed, continuing without it"
                );
                None
            }
        }
    }
}

fn approve(state: &InvoiceState) -> InvoiceState {
    let approver = if state.human_decision == Some(Decision::Accept) {
        HUMAN_APPROVER
    } else {
        POLICY_APPROVER
    };
    InvoiceState {
        stage: Some("APPROVED".to_string()),
        approval_status: Some("APPROVED".to_string()),
        approver: Some(approver.to_string()),
        ..InvoiceState::default()
    }
}

fn submitted(state: &InvoiceState) -> Result<&InvoiceSubmission, NodeError> {
    state
        .invoice
        .as_ref()
        .ok_or_else(|| NodeError::MissingInput("invoice".to_string()))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn list_field(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Node adapter
// ---------------------------------------------------------------------------

/// Graph node running one [`Stage`].
pub struct StageNode {
    stage: Stage,
    stages: Arc<InvoiceStages>,
}

impl StageNode {
    pub fn new(stage: Stage, stages: Arc<InvoiceStages>) -> Self {
        Self { stage, stages }
    }
}

impl Node<InvoiceState> for StageNode {
    fn call<'a>(
        &'a self,
        ctx: &'a NodeContext,
        state: &'a InvoiceState,
    ) -> NodeFuture<'a, InvoiceState> {
        Box::pin(self.stages.run(self.stage, ctx, state))
    }
}
