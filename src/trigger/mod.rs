//! Lifecycle trigger interface
//!
//! The only entry point through which the initializer is invoked at runtime.

mod server;

pub use server::{TRIGGER_PORT, TriggerError, create_trigger_router, run_trigger_server};
