//! Human review tickets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reviewer's verdict on a paused thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACCEPT" => Ok(Decision::Accept),
            "REJECT" => Ok(Decision::Reject),
            other => Err(format!("invalid decision: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Pending,
    Completed,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Pending => write!(f, "PENDING"),
            TicketStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TicketStatus::Pending),
            "COMPLETED" => Ok(TicketStatus::Completed),
            other => Err(format!("invalid ticket status: '{other}'")),
        }
    }
}

/// What a reviewer needs to see to decide on a ticket.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewContext {
    /// Business identifier of the item under review (e.g. the invoice id).
    pub business_id: String,
    pub counterparty: String,
    pub amount: f64,
    pub reason: String,
    /// Where the reviewer can open the item. Filled in by the queue.
    #[serde(default)]
    pub locator: String,
}

/// A pending or resolved human review attached to a paused thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTicket {
    /// `T-<n>` with `n` a per-store sequence.
    pub ticket_id: String,
    pub thread_id: String,
    pub context: ReviewContext,
    pub status: TicketStatus,
    pub decision: Option<Decision>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Format the ticket id for sequence number `seq`.
pub fn ticket_id_for(seq: i64) -> String {
    format!("T-{seq}")
}
