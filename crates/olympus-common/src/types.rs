//! Shared wire and domain types for the judge worker.

use serde::{Deserialize, Serialize};

/// Submission id. The queue transport carries these as plain integers.
pub type SubmissionId = i64;

/// Problem id.
pub type ProblemId = i64;

/// Language a submission is written in.
///
/// `Kotlin` and `Swift` are recognized so the wire schema never rejects a
/// message at parse time, but no [`LanguageAdapter`] is registered for them
/// yet — see `minos::language`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    Java,
    Python,
    Kotlin,
    Swift,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Java => write!(f, "JAVA"),
            Language::Python => write!(f, "PYTHON"),
            Language::Kotlin => write!(f, "KOTLIN"),
            Language::Swift => write!(f, "SWIFT"),
        }
    }
}

impl Language {
    /// Source file extension used inside the workspace.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "py",
            Language::Kotlin => "kt",
            Language::Swift => "swift",
        }
    }
}

/// Terminal verdict for a submission. Closed set — nothing outside this
/// enum is ever sent on the result queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompileError,
    ServerError,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Accepted => "ACCEPTED",
            Verdict::WrongAnswer => "WRONG_ANSWER",
            Verdict::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            Verdict::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Verdict::RuntimeError => "RUNTIME_ERROR",
            Verdict::CompileError => "COMPILE_ERROR",
            Verdict::ServerError => "SERVER_ERROR",
        };
        write!(f, "{s}")
    }
}

/// A submission dequeued from the ingress queue, validated and ready to judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "submissionId")]
    pub submission_id: SubmissionId,
    #[serde(rename = "problemId")]
    pub problem_id: ProblemId,
    pub username: String,
    #[serde(rename = "sourceCode")]
    pub source_code: String,
    pub language: Language,
    #[serde(rename = "timeLimitSec")]
    pub time_limit_sec: u32,
    #[serde(rename = "memoryLimitMb")]
    pub memory_limit_mb: u32,
}

/// Limits actually enforced on the sandbox, after per-language inflation.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveLimits {
    pub time_limit_sec: u32,
    pub memory_limit_mb: u32,
}

impl EffectiveLimits {
    /// Apply the language's inflation coefficients to a declared limit pair.
    ///
    /// Returns `None` for languages with no registered coefficients (Kotlin,
    /// Swift) rather than silently defaulting — an unsupported language must
    /// never reach the sandbox with an unvalidated limit.
    pub fn compute(language: Language, time_limit_sec: u32, memory_limit_mb: u32) -> Option<Self> {
        let (k_t, c_t, k_m, c_m): (u32, u32, u32, u32) = match language {
            Language::Java => (2, 1, 2, 16),
            Language::Python => (3, 2, 2, 16),
            Language::Kotlin | Language::Swift => return None,
        };
        Some(Self {
            time_limit_sec: time_limit_sec * k_t + c_t,
            memory_limit_mb: memory_limit_mb * k_m + c_m,
        })
    }
}

/// Egress message sent on the result queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "submissionId")]
    pub submission_id: SubmissionId,
    #[serde(rename = "problemId")]
    pub problem_id: ProblemId,
    pub username: String,
    #[serde(rename = "submitStatus")]
    pub submit_status: Verdict,
    #[serde(rename = "runtimeMs")]
    pub runtime_ms: Option<u64>,
    #[serde(rename = "memoryKb")]
    pub memory_kb: Option<u64>,
}

/// Progress event published on `progress:<submission_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "submissionId")]
    pub submission_id: SubmissionId,
    pub username: String,
    #[serde(rename = "submitStatus")]
    pub submit_status: String,
    #[serde(rename = "progressPercent")]
    pub progress_percent: u32,
    #[serde(rename = "currentTest")]
    pub current_test: u32,
    #[serde(rename = "totalTests")]
    pub total_tests: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "runtimeMs")]
    pub runtime_ms: Option<u64>,
    #[serde(rename = "memoryKb")]
    pub memory_kb: Option<u64>,
}

/// A single test case: an ordered input/expected-output pair, numbered by
/// the `-N` suffix it was loaded from.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub number: u32,
    pub input: String,
    pub expected: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_inflation() {
        let l = EffectiveLimits::compute(Language::Java, 2, 256).unwrap();
        assert_eq!(l.time_limit_sec, 5);
        assert_eq!(l.memory_limit_mb, 528);
    }

    #[test]
    fn python_inflation() {
        let l = EffectiveLimits::compute(Language::Python, 2, 256).unwrap();
        assert_eq!(l.time_limit_sec, 8);
        assert_eq!(l.memory_limit_mb, 528);
    }

    #[test]
    fn unsupported_language_has_no_coefficients() {
        assert!(EffectiveLimits::compute(Language::Kotlin, 1, 256).is_none());
        assert!(EffectiveLimits::compute(Language::Swift, 1, 256).is_none());
    }

    #[test]
    fn verdict_wire_format() {
        let v = serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap();
        assert_eq!(v, "\"TIME_LIMIT_EXCEEDED\"");
    }
}
