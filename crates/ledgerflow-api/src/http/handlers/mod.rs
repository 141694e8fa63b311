pub mod invoice;
pub mod review;
pub mod thread;
