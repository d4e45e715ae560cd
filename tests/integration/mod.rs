//! Integration tests for the orchestrator and its resilience components
//!
//! These tests drive the orchestrator end to end with scripted checker and
//! notifier fakes, file-backed state in a temp directory, and no real sleeps.

pub mod check_tick;
pub mod circuit;
pub mod deferred_delivery;
pub mod helpers;
pub mod shutdown;
pub mod summary_tick;
