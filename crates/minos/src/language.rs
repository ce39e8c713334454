//! Per-language compile and run recipes (C2).
//!
//! Each adapter knows the Docker image, the exact shell command (including
//! the timing shim that reports CPU time and peak memory to stderr), and
//! how to recognize an out-of-memory condition for its runtime. `Kotlin`
//! and `Swift` are valid wire values with no adapter registered —
//! `registry()` returns `None` for them rather than guessing.

use std::path::Path;

use olympus_common::{EffectiveLimits, Language};
use tokio_util::sync::CancellationToken;

use crate::sandbox::{SandboxExecutor, SandboxLimits, SandboxSpec};

/// Sandbox image + invocation for one step (compile or run).
pub struct Recipe {
    pub image: String,
    pub shell_command: String,
    pub limits: SandboxLimits,
    pub read_only_workdir: bool,
}

const SANDBOX_UID: u32 = 65334;
const SANDBOX_GID: u32 = 65334;
const RUN_PIDS_LIMIT: u32 = 64;
const RUN_TMPFS_MB: u64 = 32;

/// The bash one-liner every run command is wrapped in: times the user
/// program, then reports peak cgroup memory in KB on a sentinel stderr
/// line, preserving the user program's own exit code.
fn timing_shim(inner: &str) -> String {
    format!(
        "time {inner}; exit_code=$?; echo \"MEMORY_KB:$(($(cat /sys/fs/cgroup/memory.peak 2>/dev/null || echo 0) / 1024))\" >&2; exit $exit_code"
    )
}

pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// `None` for languages that need no separate compile step.
    fn compile_recipe(&self, timeout_sec: u64) -> Option<Recipe>;

    fn run_recipe(&self, limits: EffectiveLimits) -> Recipe;

    /// Stderr substrings that indicate an out-of-memory condition the
    /// runtime caught before the process was killed.
    fn memory_error_tokens(&self) -> &'static [&'static str];

    /// Parse `(cpu_time_ms, peak_memory_kb)` out of the timing shim's
    /// stderr output.
    fn parse_stderr(&self, stderr: &str) -> (u64, u64) {
        parse_timing_shim(stderr)
    }
}

/// Parses the `user`/`sys` `<min>m<sec>s` lines emitted by `time` and the
/// `MEMORY_KB:<n>` sentinel line. Unrecognized lines are ignored.
pub fn parse_timing_shim(stderr: &str) -> (u64, u64) {
    let mut total_ms: u64 = 0;
    let mut peak_kb: u64 = 0;

    for line in stderr.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("MEMORY_KB:") {
            peak_kb = rest.trim().parse().unwrap_or(0);
            continue;
        }
        for prefix in ["user", "sys"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                let rest = rest.trim();
                if let Some(ms) = parse_min_sec_ms(rest) {
                    total_ms += ms;
                }
            }
        }
    }

    (total_ms, peak_kb)
}

/// Parse a `<min>m<sec>s` duration (e.g. `0m1.234s`) into milliseconds.
fn parse_min_sec_ms(s: &str) -> Option<u64> {
    let (min_part, rest) = s.split_once('m')?;
    let sec_part = rest.strip_suffix('s')?;
    let minutes: f64 = min_part.trim().parse().ok()?;
    let seconds: f64 = sec_part.trim().parse().ok()?;
    Some(((minutes * 60.0 + seconds) * 1000.0).round() as u64)
}

pub struct JavaAdapter;

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn compile_recipe(&self, timeout_sec: u64) -> Option<Recipe> {
        Some(Recipe {
            image: "amazoncorretto:21".to_string(),
            shell_command: "javac -encoding UTF-8 -cp . Main.java".to_string(),
            limits: SandboxLimits {
                memory_mb: Some(256),
                cpus: 0.5,
                wall_time_sec: timeout_sec,
                pids_limit: RUN_PIDS_LIMIT,
                tmpfs_mb: RUN_TMPFS_MB,
                uid: SANDBOX_UID,
                gid: SANDBOX_GID,
            },
            read_only_workdir: false,
        })
    }

    fn run_recipe(&self, limits: EffectiveLimits) -> Recipe {
        let inner = format!(
            "java -Xmx{}m -Dfile.encoding=UTF-8 -cp . Main",
            limits.memory_limit_mb
        );
        Recipe {
            image: "amazoncorretto:21".to_string(),
            shell_command: timing_shim(&inner),
            limits: SandboxLimits {
                // JVM heap is bounded by -Xmx; no extra cgroup cap.
                memory_mb: None,
                cpus: 1.0,
                wall_time_sec: limits.time_limit_sec as u64,
                pids_limit: RUN_PIDS_LIMIT,
                tmpfs_mb: RUN_TMPFS_MB,
                uid: SANDBOX_UID,
                gid: SANDBOX_GID,
            },
            read_only_workdir: true,
        }
    }

    fn memory_error_tokens(&self) -> &'static [&'static str] {
        &["OutOfMemoryError"]
    }
}

pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn compile_recipe(&self, timeout_sec: u64) -> Option<Recipe> {
        Some(Recipe {
            image: "python:3.13-slim".to_string(),
            shell_command: "python -m py_compile Main.py".to_string(),
            limits: SandboxLimits {
                memory_mb: Some(256),
                cpus: 0.5,
                wall_time_sec: timeout_sec,
                pids_limit: RUN_PIDS_LIMIT,
                tmpfs_mb: RUN_TMPFS_MB,
                uid: SANDBOX_UID,
                gid: SANDBOX_GID,
            },
            read_only_workdir: false,
        })
    }

    fn run_recipe(&self, limits: EffectiveLimits) -> Recipe {
        let inner = "python -I -S -W ignore Main.py";
        Recipe {
            image: "python:3.13-slim".to_string(),
            shell_command: timing_shim(inner),
            limits: SandboxLimits {
                memory_mb: Some(limits.memory_limit_mb + 4),
                cpus: 1.0,
                wall_time_sec: limits.time_limit_sec as u64,
                pids_limit: RUN_PIDS_LIMIT,
                tmpfs_mb: RUN_TMPFS_MB,
                uid: SANDBOX_UID,
                gid: SANDBOX_GID,
            },
            read_only_workdir: true,
        }
    }

    fn memory_error_tokens(&self) -> &'static [&'static str] {
        &["MemoryError"]
    }
}

/// Look up the adapter for a language. `None` means the caller must
/// collapse to `SERVER_ERROR` before touching a workspace or sandbox.
pub fn adapter_for(language: Language) -> Option<Box<dyn LanguageAdapter>> {
    match language {
        Language::Java => Some(Box::new(JavaAdapter)),
        Language::Python => Some(Box::new(PythonAdapter)),
        Language::Kotlin | Language::Swift => None,
    }
}

/// Build the [`SandboxSpec`] for one recipe against a resolved host path.
pub fn spec_for<'a>(recipe: &'a Recipe, host_work_dir: &'a Path) -> SandboxSpec<'a> {
    SandboxSpec {
        image: &recipe.image,
        shell_command: &recipe.shell_command,
        work_dir: host_work_dir,
        read_only_workdir: recipe.read_only_workdir,
        limits: &recipe.limits,
    }
}

pub async fn run_recipe(
    executor: &SandboxExecutor,
    recipe: &Recipe,
    host_work_dir: &Path,
    stdin: &[u8],
    cancel: &CancellationToken,
) -> olympus_common::JudgeResult<crate::sandbox::ExecOutcome> {
    let spec = spec_for(recipe, host_work_dir);
    executor.execute(&spec, stdin, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_and_memory_lines() {
        let stderr = "real\t0m1.500s\nuser\t0m1.200s\nsys\t0m0.100s\nMEMORY_KB:20480\n";
        let (cpu_ms, mem_kb) = parse_timing_shim(stderr);
        assert_eq!(cpu_ms, 1300);
        assert_eq!(mem_kb, 20480);
    }

    #[test]
    fn missing_memory_line_defaults_to_zero() {
        let (_, mem_kb) = parse_timing_shim("user\t0m0.010s\nsys\t0m0.000s\n");
        assert_eq!(mem_kb, 0);
    }

    #[test]
    fn java_run_recipe_has_no_cgroup_memory_cap() {
        let limits = EffectiveLimits::compute(Language::Java, 2, 256).unwrap();
        let recipe = JavaAdapter.run_recipe(limits);
        assert!(recipe.limits.memory_mb.is_none());
        assert!(recipe.shell_command.contains("-Xmx528m"));
    }

    #[test]
    fn python_run_recipe_sets_cgroup_memory_cap() {
        let limits = EffectiveLimits::compute(Language::Python, 2, 256).unwrap();
        let recipe = PythonAdapter.run_recipe(limits);
        assert_eq!(recipe.limits.memory_mb, Some(532));
    }

    #[test]
    fn kotlin_and_swift_have_no_adapter() {
        assert!(adapter_for(Language::Kotlin).is_none());
        assert!(adapter_for(Language::Swift).is_none());
    }
}
