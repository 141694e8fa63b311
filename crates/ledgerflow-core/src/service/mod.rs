pub mod workflow;

pub use workflow::{
    DecisionAck, RecoveryReport, ReviewTicketHook, ReviewableState, ServiceError, WorkflowService,
};
