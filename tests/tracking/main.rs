//! Tracking Tests
//!
//! Registry behavior through the public API:
//! - State transitions and events
//! - Change detection
//! - Fixup, identity and key propagation
//! - Cascade and orphan timing

#[path = "../common/mod.rs"]
mod common;

mod cascade_timing;
mod detection;
mod errors;
mod fixup;
mod key_propagation;
mod state_transitions;
