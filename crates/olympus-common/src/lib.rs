//! Common types, errors, and utilities shared by Olympus judge services.

pub mod error;
pub mod types;

pub use error::{JudgeError, JudgeResult};
pub use types::*;
