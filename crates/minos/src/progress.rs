//! Progress publication (C6): best-effort pub/sub on `progress:<id>`.
//!
//! Delivery failures are logged and swallowed — progress is an
//! observability side channel, never part of the verdict.

use chrono::Utc;
use olympus_common::{ProgressEvent, SubmissionId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub struct ProgressPublisher {
    conn: ConnectionManager,
}

impl ProgressPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    pub async fn judging_started(&mut self, submission_id: SubmissionId, username: &str, total_tests: u32) {
        self.publish(ProgressEvent {
            submission_id,
            username: username.to_string(),
            submit_status: "JUDGING".to_string(),
            progress_percent: 0,
            current_test: 0,
            total_tests,
            timestamp: Utc::now(),
            runtime_ms: None,
            memory_kb: None,
        })
        .await;
    }

    pub async fn test_case_completed(
        &mut self,
        submission_id: SubmissionId,
        username: &str,
        current_test: u32,
        total_tests: u32,
    ) {
        let progress_percent = (current_test as f64 / total_tests as f64 * 100.0) as u32;
        self.publish(ProgressEvent {
            submission_id,
            username: username.to_string(),
            submit_status: "JUDGING".to_string(),
            progress_percent,
            current_test,
            total_tests,
            timestamp: Utc::now(),
            runtime_ms: None,
            memory_kb: None,
        })
        .await;
    }

    pub async fn judging_completed(
        &mut self,
        submission_id: SubmissionId,
        username: &str,
        verdict: &str,
        runtime_ms: Option<u64>,
        memory_kb: Option<u64>,
    ) {
        self.publish(ProgressEvent {
            submission_id,
            username: username.to_string(),
            submit_status: verdict.to_string(),
            progress_percent: 100,
            current_test: 0,
            total_tests: 0,
            timestamp: Utc::now(),
            runtime_ms,
            memory_kb,
        })
        .await;
    }

    async fn publish(&mut self, event: ProgressEvent) {
        let channel = format!("progress:{}", event.submission_id);
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize progress event");
                return;
            }
        };
        // Fire-and-forget: a dropped progress update never fails a submission.
        let result: Result<(), redis::RedisError> = self.conn.publish(&channel, payload).await;
        if let Err(e) = result {
            tracing::warn!(error = %e, channel = %channel, "failed to publish progress event");
        }
    }
}
