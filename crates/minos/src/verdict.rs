//! Verdict derivation (C5): fold one [`ExecOutcome`] into a running
//! judging state, in the precedence order fixed by `_evaluate_code` in the
//! original judge: timeout, then OOM, then missing-executable, then any
//! other non-zero exit, then output mismatch.

use olympus_common::{EffectiveLimits, Verdict};

use crate::sandbox::ExecOutcome;

/// Outcome of folding one test case into the running judgement.
pub enum Fold {
    /// Keep going; maxima have been updated.
    Continue,
    /// Stop the loop with this verdict.
    Terminal(Verdict),
}

/// Running maxima across accepted test cases, surfaced on `ACCEPTED`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMaxima {
    pub max_cpu_time_ms: u64,
    pub max_peak_memory_kb: u64,
}

/// Apply the precedence rules in order. `memory_error_tokens` comes from
/// the language adapter; `cpu_time_ms`/`peak_memory_kb` are already parsed
/// from the outcome's stderr by the caller.
pub fn reduce(
    outcome: &ExecOutcome,
    expected: &str,
    limits: EffectiveLimits,
    cpu_time_ms: u64,
    peak_memory_kb: u64,
    memory_error_tokens: &[&str],
    maxima: &mut RunningMaxima,
) -> Fold {
    if outcome.wall_exceeded || cpu_time_ms > limits.time_limit_sec as u64 * 1000 {
        return Fold::Terminal(Verdict::TimeLimitExceeded);
    }

    if outcome.exit_code == 137
        || memory_error_tokens
            .iter()
            .any(|tok| outcome.stderr.contains(tok))
    {
        return Fold::Terminal(Verdict::MemoryLimitExceeded);
    }

    if outcome.exit_code == 127 {
        return Fold::Terminal(Verdict::ServerError);
    }

    if outcome.exit_code != 0 {
        return Fold::Terminal(Verdict::RuntimeError);
    }

    if strip(&outcome.stdout) != strip(expected) {
        return Fold::Terminal(Verdict::WrongAnswer);
    }

    maxima.max_cpu_time_ms = maxima.max_cpu_time_ms.max(cpu_time_ms);
    maxima.max_peak_memory_kb = maxima.max_peak_memory_kb.max(peak_memory_kb);
    Fold::Continue
}

/// Trim trailing whitespace (spaces, tabs, CR, LF) from the whole payload.
/// No per-line normalization — a trailing space mid-output still fails.
fn strip(s: &str) -> &str {
    s.trim_end_matches([' ', '\t', '\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(time_sec: u32) -> EffectiveLimits {
        EffectiveLimits {
            time_limit_sec: time_sec,
            memory_limit_mb: 256,
        }
    }

    fn outcome(exit_code: i32, stdout: &str, stderr: &str, wall_exceeded: bool) -> ExecOutcome {
        ExecOutcome {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            wall_exceeded,
        }
    }

    #[test]
    fn wall_exceeded_wins_over_everything() {
        let o = outcome(137, "x", "OutOfMemoryError", true);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "x", limits(1), 50, 10, &["OutOfMemoryError"], &mut maxima);
        assert!(matches!(fold, Fold::Terminal(Verdict::TimeLimitExceeded)));
    }

    #[test]
    fn oom_beats_runtime_error() {
        let o = outcome(137, "", "", false);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "x", limits(5), 10, 300_000, &[], &mut maxima);
        assert!(matches!(fold, Fold::Terminal(Verdict::MemoryLimitExceeded)));
    }

    #[test]
    fn missing_executable_is_server_error() {
        let o = outcome(127, "", "", false);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "x", limits(5), 10, 10, &[], &mut maxima);
        assert!(matches!(fold, Fold::Terminal(Verdict::ServerError)));
    }

    #[test]
    fn nonzero_exit_is_runtime_error() {
        let o = outcome(1, "", "", false);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "x", limits(5), 10, 10, &[], &mut maxima);
        assert!(matches!(fold, Fold::Terminal(Verdict::RuntimeError)));
    }

    #[test]
    fn mismatch_is_wrong_answer() {
        let o = outcome(0, "nope\n", "", false);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "x\n", limits(5), 10, 10, &[], &mut maxima);
        assert!(matches!(fold, Fold::Terminal(Verdict::WrongAnswer)));
    }

    #[test]
    fn trailing_whitespace_is_ignored_but_not_interior() {
        let o = outcome(0, "42\n", "", false);
        let mut maxima = RunningMaxima::default();
        let fold = reduce(&o, "42\n\n", limits(5), 10, 10, &[], &mut maxima);
        assert!(matches!(fold, Fold::Continue));
    }

    #[test]
    fn accepted_updates_running_maxima() {
        let o = outcome(0, "42", "", false);
        let mut maxima = RunningMaxima {
            max_cpu_time_ms: 5,
            max_peak_memory_kb: 100,
        };
        let fold = reduce(&o, "42", limits(5), 50, 50, &[], &mut maxima);
        assert!(matches!(fold, Fold::Continue));
        assert_eq!(maxima.max_cpu_time_ms, 50);
        assert_eq!(maxima.max_peak_memory_kb, 100);
    }
}
