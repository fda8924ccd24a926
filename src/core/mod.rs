//! Core constants and traits (always available).

pub mod constants;
mod traits;

pub use traits::{Channel, is_deadline_expiry};
