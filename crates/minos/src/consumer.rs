//! Queue consumer (C8, ambient): long-polls the ingress queue, validates
//! and dispatches each submission to the orchestrator, then publishes the
//! egress result and deletes the ingress message.
//!
//! Mirrors `worker.py`'s `consume_loop`: one message at a time, a short
//! sleep-and-retry on transport errors, and no acknowledgement before the
//! terminal verdict has actually been sent.

use std::sync::Arc;

use aws_sdk_sqs::Client as SqsClient;
use olympus_common::{ResultMessage, Submission};
use redis::aio::ConnectionManager;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressPublisher;

pub struct QueueConsumer {
    sqs: SqsClient,
    consume_queue_url: String,
    produce_queue_url: String,
    orchestrator: Arc<Orchestrator>,
    redis_conn: ConnectionManager,
    max_source_bytes: usize,
}

impl QueueConsumer {
    pub fn new(
        sqs: SqsClient,
        consume_queue_url: String,
        produce_queue_url: String,
        orchestrator: Arc<Orchestrator>,
        redis_conn: ConnectionManager,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            sqs,
            consume_queue_url,
            produce_queue_url,
            orchestrator,
            redis_conn,
            max_source_bytes,
        }
    }

    /// Resolve a queue name to its URL once at startup.
    pub async fn queue_url(sqs: &SqsClient, name: &str) -> anyhow::Result<String> {
        let resp = sqs.get_queue_url().queue_name(name).send().await?;
        resp.queue_url
            .ok_or_else(|| anyhow::anyhow!("queue {name} has no url"))
    }

    /// Spawn `worker_threads` tasks that all pull from the same ingress
    /// queue, sharing this consumer's clients — mirroring the three
    /// daemon threads the original server runs against one SQS client.
    ///
    /// `shutdown` is threaded all the way down into the sandbox executor's
    /// wait (see `sandbox::SandboxExecutor::execute`), so a cancelled
    /// submission kills its sandbox child rather than draining to
    /// completion.
    pub fn spawn_workers(
        self: Arc<Self>,
        worker_threads: usize,
        shutdown: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_threads)
            .map(|id| {
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.run(id, shutdown).await })
            })
            .collect()
    }

    async fn run(&self, worker_id: usize, shutdown: CancellationToken) {
        tracing::info!(worker_id, "consumer loop started");
        while !shutdown.is_cancelled() {
            if let Err(e) = self.process_next(&shutdown).await {
                tracing::error!(worker_id, error = %e, "error in consume loop");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {},
                    _ = shutdown.cancelled() => break,
                }
            }
        }
        tracing::info!(worker_id, "consumer loop stopped");
    }

    async fn process_next(&self, shutdown: &CancellationToken) -> anyhow::Result<()> {
        let resp = self
            .sqs
            .receive_message()
            .queue_url(&self.consume_queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(10)
            .message_attribute_names("All")
            .send()
            .await?;

        let Some(message) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(());
        };
        let Some(body) = &message.body else {
            return Ok(());
        };

        let submission: Submission = match serde_json::from_str(body) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, body = %body, "malformed submission message, discarding");
                self.delete_message(&message).await;
                return Ok(());
            }
        };

        if submission.source_code.len() > self.max_source_bytes {
            tracing::warn!(
                submission_id = submission.submission_id,
                source_bytes = submission.source_code.len(),
                max = self.max_source_bytes,
                "submission source exceeds configured maximum, discarding"
            );
            self.delete_message(&message).await;
            return Ok(());
        }

        tracing::info!(
            submission_id = submission.submission_id,
            problem_id = submission.problem_id,
            language = %submission.language,
            "judging submission"
        );

        metrics::ACTIVE_JOBS.inc();
        let mut progress = ProgressPublisher::new(self.redis_conn.clone());
        let judgement = self
            .orchestrator
            .judge(&submission, &mut progress, shutdown)
            .await;
        metrics::ACTIVE_JOBS.dec();

        if shutdown.is_cancelled() {
            tracing::warn!(
                submission_id = submission.submission_id,
                "judging aborted by shutdown signal, leaving message for redelivery"
            );
            return Ok(());
        }

        metrics::JOBS_PROCESSED.inc();
        if judgement.verdict == olympus_common::Verdict::ServerError {
            metrics::JOBS_FAILED.inc();
        }
        metrics::record_verdict(&judgement.verdict.to_string());

        let result = ResultMessage {
            submission_id: submission.submission_id,
            problem_id: submission.problem_id,
            username: submission.username.clone(),
            submit_status: judgement.verdict,
            runtime_ms: judgement.runtime_ms,
            memory_kb: judgement.memory_kb,
        };
        self.send_result(&result).await?;

        tracing::info!(
            submission_id = submission.submission_id,
            verdict = %judgement.verdict,
            "judging finished"
        );

        self.delete_message(&message).await;
        Ok(())
    }

    async fn send_result(&self, result: &ResultMessage) -> anyhow::Result<()> {
        let body = serde_json::to_string(result)?;
        self.sqs
            .send_message()
            .queue_url(&self.produce_queue_url)
            .message_body(body)
            .message_group_id("results")
            .message_deduplication_id(result.submission_id.to_string())
            .send()
            .await?;
        Ok(())
    }

    async fn delete_message(&self, message: &aws_sdk_sqs::types::Message) {
        let Some(handle) = &message.receipt_handle else {
            return;
        };
        if let Err(e) = self
            .sqs
            .delete_message()
            .queue_url(&self.consume_queue_url)
            .receipt_handle(handle)
            .send()
            .await
        {
            tracing::warn!(error = %e, "failed to delete ingress message");
        }
    }
}
