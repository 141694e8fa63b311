//! Capability worker transport: JSON-RPC sessions and the pooled router.

pub mod protocol;
pub mod router;
pub mod session;

pub use router::WorkerRouter;
