//! Submission orchestration (C7): the state machine from a dequeued
//! submission to a published verdict.
//!
//! `RECEIVED → MATERIALIZED → COMPILED? → JUDGING → TERMINAL`, with
//! workspace cleanup and a terminal progress event guaranteed on every
//! exit path.

use std::path::PathBuf;

use olympus_common::{EffectiveLimits, JudgeError, JudgeResult, Submission, Verdict};
use tokio_util::sync::CancellationToken;

use crate::config::resolve_host_path;
use crate::language::{adapter_for, run_recipe, spec_for};
use crate::metrics;
use crate::progress::ProgressPublisher;
use crate::sandbox::SandboxExecutor;
use crate::testdata::TestDataProvider;
use crate::verdict::{self, RunningMaxima};
use crate::workspace::WorkspaceManager;

pub struct Orchestrator {
    workspace: WorkspaceManager,
    testdata: TestDataProvider,
    sandbox: SandboxExecutor,
    host_mount_table: Vec<(PathBuf, PathBuf)>,
    compile_timeout_sec: u64,
}

/// Terminal outcome of one submission.
pub struct Judgement {
    pub verdict: Verdict,
    pub runtime_ms: Option<u64>,
    pub memory_kb: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        workspace: WorkspaceManager,
        testdata: TestDataProvider,
        sandbox: SandboxExecutor,
        host_mount_table: Vec<(PathBuf, PathBuf)>,
        compile_timeout_sec: u64,
    ) -> Self {
        Self {
            workspace,
            testdata,
            sandbox,
            host_mount_table,
            compile_timeout_sec,
        }
    }

    /// Judge one submission end to end. Never panics and never leaves a
    /// workspace behind: cleanup and a terminal progress event are
    /// guaranteed regardless of which stage failed.
    pub async fn judge(
        &self,
        submission: &Submission,
        progress: &mut ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Judgement {
        let result = self.judge_inner(submission, progress, cancel).await;

        self.workspace
            .destroy(submission.submission_id, &submission.username)
            .await;

        let judgement = match result {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    submission_id = submission.submission_id,
                    problem_id = submission.problem_id,
                    "submission failed before a verdict could be derived"
                );
                Judgement {
                    verdict: Verdict::ServerError,
                    runtime_ms: None,
                    memory_kb: None,
                }
            }
        };

        progress
            .judging_completed(
                submission.submission_id,
                &submission.username,
                &judgement.verdict.to_string(),
                judgement.runtime_ms,
                judgement.memory_kb,
            )
            .await;

        judgement
    }

    async fn judge_inner(
        &self,
        submission: &Submission,
        progress: &mut ProgressPublisher,
        cancel: &CancellationToken,
    ) -> JudgeResult<Judgement> {
        let adapter = adapter_for(submission.language)
            .ok_or(JudgeError::UnsupportedLanguage(submission.language))?;
        let effective = EffectiveLimits::compute(
            submission.language,
            submission.time_limit_sec,
            submission.memory_limit_mb,
        )
        .ok_or(JudgeError::UnsupportedLanguage(submission.language))?;

        let workspace = self
            .workspace
            .materialize(
                &submission.source_code,
                submission.submission_id,
                &submission.username,
                submission.language,
            )
            .await?;
        let host_dir = resolve_host_path(&workspace.dir, &self.host_mount_table);

        if let Some(compile_recipe) = adapter.compile_recipe(self.compile_timeout_sec) {
            let spec = spec_for(&compile_recipe, &host_dir);
            let outcome = self.sandbox.execute(&spec, &[], cancel).await?;
            if outcome.exit_code != 0 {
                let cause = JudgeError::Compile(outcome.stderr.clone());
                tracing::error!(
                    error = %cause,
                    submission_id = submission.submission_id,
                    problem_id = submission.problem_id,
                    "compile failed"
                );
                return Ok(Judgement {
                    verdict: Verdict::CompileError,
                    runtime_ms: None,
                    memory_kb: None,
                });
            }
        }

        let cases = self.testdata.fetch(submission.problem_id).await?;
        if cases.is_empty() {
            return Err(JudgeError::TestData(format!(
                "problem {} has no test cases",
                submission.problem_id
            )));
        }
        let total_tests = cases.len() as u32;
        progress
            .judging_started(submission.submission_id, &submission.username, total_tests)
            .await;

        let recipe = adapter.run_recipe(effective);
        let mut maxima = RunningMaxima::default();

        for (idx, case) in cases.iter().enumerate() {
            let outcome =
                run_recipe(&self.sandbox, &recipe, &host_dir, case.input.as_bytes(), cancel).await?;
            let (cpu_time_ms, peak_memory_kb) = adapter.parse_stderr(&outcome.stderr);

            match verdict::reduce(
                &outcome,
                &case.expected,
                effective,
                cpu_time_ms,
                peak_memory_kb,
                adapter.memory_error_tokens(),
                &mut maxima,
            ) {
                verdict::Fold::Terminal(v) => {
                    return Ok(Judgement {
                        verdict: v,
                        runtime_ms: None,
                        memory_kb: None,
                    });
                }
                verdict::Fold::Continue => {
                    progress
                        .test_case_completed(
                            submission.submission_id,
                            &submission.username,
                            (idx + 1) as u32,
                            total_tests,
                        )
                        .await;
                }
            }
        }

        metrics::record_execution(
            &submission.problem_id.to_string(),
            maxima.max_cpu_time_ms as f64 / 1000.0,
            maxima.max_peak_memory_kb * 1024,
        );

        Ok(Judgement {
            verdict: Verdict::Accepted,
            runtime_ms: Some(maxima.max_cpu_time_ms),
            memory_kb: Some(maxima.max_peak_memory_kb),
        })
    }
}
