//! Merge and review behaviour of [`InvoiceState`].

use ledgerflow_types::invoice::InvoiceState;
use ledgerflow_types::review::{Decision, ReviewContext};
use serde_json::{Value, json};

use crate::graph::{GraphState, merge_field};
use crate::service::ReviewableState;

impl GraphState for InvoiceState {
    fn merge(&mut self, update: Self) {
        merge_field(&mut self.invoice, update.invoice);
        merge_field(&mut self.stage, update.stage);
        merge_field(&mut self.raw_id, update.raw_id);
        merge_field(&mut self.parsed_invoice, update.parsed_invoice);
        merge_field(&mut self.po_number, update.po_number);
        merge_field(&mut self.ocr_provider, update.ocr_provider);
        merge_field(&mut self.vendor_name, update.vendor_name);
        merge_field(&mut self.vendor_profile, update.vendor_profile);
        merge_field(&mut self.validation_flags, update.validation_flags);
        merge_field(&mut self.matched_pos, update.matched_pos);
        merge_field(&mut self.matched_grns, update.matched_grns);
        merge_field(&mut self.history, update.history);
        merge_field(&mut self.match_score, update.match_score);
        merge_field(&mut self.match_result, update.match_result);
        merge_field(&mut self.match_notes, update.match_notes);
        merge_field(&mut self.hold_reason, update.hold_reason);
        merge_field(&mut self.human_decision, update.human_decision);
        merge_field(&mut self.reviewer_notes, update.reviewer_notes);
        merge_field(&mut self.accounting_entries, update.accounting_entries);
        merge_field(&mut self.approval_status, update.approval_status);
        merge_field(&mut self.approver, update.approver);
        merge_field(&mut self.erp_txn_id, update.erp_txn_id);
        merge_field(&mut self.payment_id, update.payment_id);
        merge_field(&mut self.notified, update.notified);
    }
}

impl ReviewableState for InvoiceState {
    fn review_context(&self) -> ReviewContext {
        ReviewContext {
            business_id: self.invoice_id().to_string(),
            counterparty: self.effective_vendor_name().to_string(),
            amount: self.amount(),
            reason: self
                .hold_reason
                .clone()
                .unwrap_or_else(|| "manual review requested".to_string()),
            locator: String::new(),
        }
    }

    fn decision_patch(decision: Decision, notes: Option<&str>) -> Value {
        json!({
            "human_decision": decision,
            "reviewer_notes": notes,
        })
    }

    fn has_decision(&self) -> bool {
        self.human_decision.is_some()
    }

    fn stage_after(decision: Decision) -> &'static str {
        match decision {
            Decision::Accept => "RECONCILE",
            Decision::Reject => "TERMINATED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_types::checkpoint::merge_snapshot_fields;
    use ledgerflow_types::invoice::{InvoiceSubmission, MatchResult};

    fn state() -> InvoiceState {
        InvoiceState::from_submission(InvoiceSubmission {
            invoice_id: "INV-1".to_string(),
            vendor_name: "Acme Corp".to_string(),
            amount: 1000.0,
            currency: "USD".to_string(),
            attachments: vec![],
        })
    }

    #[test]
    fn test_merge_later_non_null_wins() {
        let mut current = state();
        current.match_score = Some(0.4);
        current.raw_id = Some("RAW-1".to_string());

        current.merge(InvoiceState {
            match_score: Some(0.95),
            match_result: Some(MatchResult::Matched),
            ..InvoiceState::default()
        });

        assert_eq!(current.match_score, Some(0.95));
        assert_eq!(current.match_result, Some(MatchResult::Matched));
        assert_eq!(current.raw_id.as_deref(), Some("RAW-1"));
        assert_eq!(current.invoice_id(), "INV-1");
    }

    #[test]
    fn test_review_context_uses_hold_reason() {
        let mut s = state();
        s.vendor_name = Some("ACME CORP".to_string());
        s.hold_reason = Some("Match score 0.62 below threshold 0.90".to_string());

        let ctx = s.review_context();
        assert_eq!(ctx.business_id, "INV-1");
        assert_eq!(ctx.counterparty, "ACME CORP");
        assert_eq!(ctx.amount, 1000.0);
        assert!(ctx.reason.starts_with("Match score 0.62"));
    }

    #[test]
    fn test_decision_patch_without_notes_keeps_existing_notes() {
        let mut snapshot = serde_json::to_value(InvoiceState {
            reviewer_notes: Some("earlier".to_string()),
            ..state()
        })
        .unwrap();

        merge_snapshot_fields(&mut snapshot, &InvoiceState::decision_patch(Decision::Reject, None));

        let merged: InvoiceState = serde_json::from_value(snapshot).unwrap();
        assert!(!state().has_decision());
        assert!(merged.has_decision());
        assert_eq!(merged.human_decision, Some(Decision::Reject));
        assert_eq!(merged.reviewer_notes.as_deref(), Some("earlier"));
        assert_eq!(InvoiceState::stage_after(Decision::Reject), "TERMINATED");
    }
}
