//! Test helpers for FirstUser Connect.
//!
//! The [`TestReceiver`] stands in for a partner backend: it records every
//! signed webhook delivery, verifies signatures the way a real receiver
//! must (constant-time, rejecting bad signatures with 401 before trusting
//! the payload), and can be told to fail upcoming requests to exercise the
//! retry schedule.
//!
//! This is deliberately a test harness — durable rows with uniqueness
//! constraints live in the real adapters, not here.

mod receiver;
mod seed;

pub use receiver::{ReceivedWebhook, TestReceiver};
pub use seed::seed_app_with_key;
