//! Notification channels - every way a payment's status reaches the reconciliation engine.
//!
//! The processor webhook lives in [`crate::server`]; the chat-driven channels live here.

/// Opening a hosted payment with the external processor
pub mod checkout;
/// Successful in-chat payment callback
pub mod in_band;
/// User-initiated payment status check
pub mod poll;
