// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for pg-bootstrap
//!
//! This module contains unit tests for:
//! - The idempotent initializer against a recording administrative interface
//! - Step sequencing, ordering, and fail-fast behavior
//! - The readiness gate and its probe
//! - Lifecycle wire format and the trigger endpoint
//! - End-to-end bootstrap runs

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod trigger;
