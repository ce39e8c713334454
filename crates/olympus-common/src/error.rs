//! Typed error causes for the judge worker.
//!
//! `JudgeError` never leaves the orchestrator boundary: callers collapse it
//! to a [`crate::types::Verdict`] before it reaches the egress message. It
//! exists so the collapse can still be logged with structure.

use thiserror::Error;

use crate::types::Language;

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("test data error: {0}")]
    TestData(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("compile failed: {0}")]
    Compile(String),

    #[error("no language adapter registered for {0}")]
    UnsupportedLanguage(Language),
}

pub type JudgeResult<T> = Result<T, JudgeError>;
