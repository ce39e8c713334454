//! Configuration for the Minos judge worker, loaded once at startup.

use std::env;
use std::path::PathBuf;

/// Minos configuration loaded from environment variables.
///
/// Loaded once in `main` and shared behind an `Arc`; there is no live
/// reload, matching the rest of the worker's no-hidden-state design.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region for SQS and S3.
    pub aws_region: String,
    /// Static credentials, when not relying on the default provider chain.
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,

    /// Ingress queue (submissions to judge).
    pub consume_queue_name: String,
    /// Egress queue (judge results).
    pub produce_queue_name: String,

    /// Bucket holding problem test data.
    pub s3_bucket_name: String,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,

    /// Number of concurrent consumer tasks sharing the queue clients.
    pub worker_threads: usize,
    /// Maximum redeliveries before a message is dead-lettered. Enforced by
    /// the ingress queue's redrive policy, not by this worker — the worker
    /// never retries a submission itself (§5 backpressure rule), but this
    /// value is surfaced so deployment tooling can configure the queue to
    /// match.
    pub max_retries: u32,

    pub metrics_port: u16,

    pub storage: StorageConfig,
    pub execution: ExecutionConfig,
}

/// Local filesystem roots, plus their host-side counterparts for
/// sibling-container bind mounts (§4.2 host-path resolution).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Per-submission scratch workspaces.
    pub temp_dir: PathBuf,
    /// Host-side path of `temp_dir`, when this worker itself runs in a
    /// container and mounts paths into sibling sandbox containers.
    pub temp_dir_host: Option<PathBuf>,

    /// Local mirror of problem test data.
    pub problem_dir: PathBuf,
    pub problem_dir_host: Option<PathBuf>,
}

/// Execution tunables.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum accepted submission source size.
    pub max_source_bytes: usize,
    /// Stderr is truncated to this many bytes before parsing/logging.
    pub stderr_cap_bytes: usize,
    /// Grace period added to the run wall-clock bound, in seconds.
    pub run_grace_sec: u32,
    /// Hard timeout for compilation, in seconds.
    pub compile_timeout_sec: u32,
    /// Grace period between SIGTERM and SIGKILL when tearing down a
    /// runaway sandbox process.
    pub kill_grace_sec: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// development-friendly defaults so the worker can start with nothing
    /// set beyond AWS/Redis connection details.
    pub fn from_env() -> Self {
        let temp_dir =
            PathBuf::from(env::var("TEMP_DIR").unwrap_or_else(|_| "/mnt/data/temp".to_string()));
        let problem_dir = PathBuf::from(
            env::var("PROBLEM_DIR").unwrap_or_else(|_| "/mnt/data/problems".to_string()),
        );

        Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-northeast-2".to_string()),
            aws_access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            aws_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),

            consume_queue_name: env::var("CONSUME_QUEUE_NAME")
                .unwrap_or_else(|_| "judge-submissions".to_string()),
            produce_queue_name: env::var("PRODUCE_QUEUE_NAME")
                .unwrap_or_else(|_| "judge-results".to_string()),

            s3_bucket_name: env::var("S3_BUCKET_NAME")
                .unwrap_or_else(|_| "olympus-judge-data".to_string()),

            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            redis_password: env::var("REDIS_PASSWORD").ok(),

            worker_threads: env::var("WORKER_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9091),

            storage: StorageConfig {
                temp_dir_host: env::var("TEMP_DIR_HOST").ok().map(PathBuf::from),
                problem_dir_host: env::var("PROBLEM_DIR_HOST").ok().map(PathBuf::from),
                temp_dir,
                problem_dir,
            },

            execution: ExecutionConfig {
                max_source_bytes: env::var("MAX_SOURCE_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(256 * 1024),
                stderr_cap_bytes: env::var("STDERR_CAP_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(64 * 1024),
                run_grace_sec: env::var("RUN_GRACE_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
                compile_timeout_sec: env::var("COMPILE_TIMEOUT_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(90),
                kill_grace_sec: env::var("KILL_GRACE_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            },
        }
    }

    /// Redis connection string for the `redis` crate.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(pw) => format!("redis://:{}@{}:{}", pw, self.redis_host, self.redis_port),
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }
}

/// Ordered `(container_root, host_root)` mapping entries for sibling
/// container bind mounts. The longest-matching prefix wins; unmapped paths
/// pass through unchanged.
pub fn host_mount_table(storage: &StorageConfig) -> Vec<(PathBuf, PathBuf)> {
    let mut table = Vec::new();
    if let Some(host) = &storage.temp_dir_host {
        table.push((storage.temp_dir.clone(), host.clone()));
    }
    if let Some(host) = &storage.problem_dir_host {
        table.push((storage.problem_dir.clone(), host.clone()));
    }
    table
}

/// Translate a container-internal path to its host-side equivalent using
/// `table`, matching the longest container-root prefix. Falls through to
/// `path` unchanged when nothing matches.
pub fn resolve_host_path(path: &std::path::Path, table: &[(PathBuf, PathBuf)]) -> PathBuf {
    let mut best: Option<(&PathBuf, &PathBuf)> = None;
    for (container_root, host_root) in table {
        if path.starts_with(container_root) {
            let better = match best {
                Some((cur, _)) => container_root.as_os_str().len() > cur.as_os_str().len(),
                None => true,
            };
            if better {
                best = Some((container_root, host_root));
            }
        }
    }
    match best {
        Some((container_root, host_root)) => {
            let rel = path.strip_prefix(container_root).unwrap_or(path);
            host_root.join(rel)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_mapped_prefix() {
        let table = vec![(
            PathBuf::from("/mnt/data/temp"),
            PathBuf::from("/var/lib/docker/volumes/olympus_data/_data/temp"),
        )];
        let resolved = resolve_host_path(std::path::Path::new("/mnt/data/temp/alice/42"), &table);
        assert_eq!(
            resolved,
            PathBuf::from("/var/lib/docker/volumes/olympus_data/_data/temp/alice/42")
        );
    }

    #[test]
    fn passthrough_when_unmapped() {
        let resolved = resolve_host_path(std::path::Path::new("/some/other/path"), &[]);
        assert_eq!(resolved, PathBuf::from("/some/other/path"));
    }
}
