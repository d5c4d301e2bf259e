//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CategoryState`: scan state of one category (not started, in progress, exhausted)
//! - `CategoryProgress`: page cursor and counters that drive the state

mod category_state;

// Re-export main types
pub use category_state::{CategoryProgress, CategoryState, ExhaustReason};
