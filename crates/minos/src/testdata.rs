//! Test-data resolution (C3): problem id → ordered input/expected pairs.
//!
//! Mirrors `problem_data_manager.py`: prefer a local mirror, else download
//! every object under `problems/<problem_id>/test_data/` from the blob
//! store, then pair files by the numeric suffix in their name.

use std::path::{Path, PathBuf};

use aws_sdk_s3::Client as S3Client;
use olympus_common::{JudgeError, JudgeResult, ProblemId, TestCase};
use regex::Regex;
use tokio::fs;

/// `^.+-(\d+)\.(in|out)$` — the exact naming convention test files use.
fn case_pattern() -> Regex {
    Regex::new(r"^.+-(\d+)\.(in|out)$").expect("static regex is valid")
}

pub struct TestDataProvider {
    problem_dir: PathBuf,
    bucket: String,
    s3: S3Client,
}

impl TestDataProvider {
    pub fn new(problem_dir: PathBuf, bucket: String, s3: S3Client) -> Self {
        Self {
            problem_dir,
            bucket,
            s3,
        }
    }

    fn local_dir(&self, problem_id: ProblemId) -> PathBuf {
        self.problem_dir.join(problem_id.to_string()).join("test_data")
    }

    /// Resolve the ordered test case list for `problem_id`, downloading
    /// from the blob store on a cold cache.
    pub async fn fetch(&self, problem_id: ProblemId) -> JudgeResult<Vec<TestCase>> {
        let dir = self.local_dir(problem_id);

        let has_local = match fs::read_dir(&dir).await {
            Ok(mut entries) => entries
                .next_entry()
                .await
                .map(|e| e.is_some())
                .unwrap_or(false),
            Err(_) => false,
        };

        if !has_local {
            self.download_test_data(problem_id, &dir).await?;
        }

        self.load_test_files(&dir).await
    }

    /// Download every object under the problem's test-data prefix into a
    /// uniquely-named staging directory, then atomically rename it into
    /// place. A losing racer's rename fails because the winner already
    /// occupies `dir`; it discards its staging copy and reads the
    /// winner's directory instead.
    async fn download_test_data(&self, problem_id: ProblemId, dir: &Path) -> JudgeResult<()> {
        let prefix = format!("problems/{problem_id}/test_data/");
        let staging = dir.with_file_name(format!(
            ".staging-{}-{}",
            problem_id,
            std::process::id()
        ));
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| JudgeError::TestData(format!("create staging dir: {e}")))?;

        let mut continuation: Option<String> = None;
        let mut found_any = false;
        loop {
            let mut req = self.s3.list_objects_v2().bucket(&self.bucket).prefix(&prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| JudgeError::TestData(format!("list_objects_v2: {e}")))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                let Some(name) = key.rsplit('/').next() else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                found_any = true;

                let get = self
                    .s3
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| JudgeError::TestData(format!("get_object {key}: {e}")))?;
                let bytes = get
                    .body
                    .collect()
                    .await
                    .map_err(|e| JudgeError::TestData(format!("read body {key}: {e}")))?
                    .into_bytes();
                fs::write(staging.join(name), &bytes)
                    .await
                    .map_err(|e| JudgeError::TestData(format!("write {name}: {e}")))?;
            }

            continuation = resp.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }

        if !found_any {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(JudgeError::TestData(format!(
                "no test data found for problem {problem_id}"
            )));
        }

        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| JudgeError::TestData(format!("create parent dir: {e}")))?;
        }

        match fs::rename(&staging, dir).await {
            Ok(()) => Ok(()),
            Err(_) => {
                // Another worker won the race; discard our copy.
                let _ = fs::remove_dir_all(&staging).await;
                Ok(())
            }
        }
    }

    async fn load_test_files(&self, dir: &Path) -> JudgeResult<Vec<TestCase>> {
        let pattern = case_pattern();
        let mut ins: Vec<(u32, PathBuf)> = Vec::new();
        let mut outs: Vec<(u32, PathBuf)> = Vec::new();

        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| JudgeError::TestData(format!("read_dir {}: {e}", dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JudgeError::TestData(format!("read_dir entry: {e}")))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(caps) = pattern.captures(name) else {
                continue;
            };
            let n: u32 = caps[1]
                .parse()
                .map_err(|_| JudgeError::TestData(format!("bad test number in {name}")))?;
            match &caps[2] {
                "in" => ins.push((n, path)),
                "out" => outs.push((n, path)),
                _ => unreachable!(),
            }
        }

        ins.sort_by_key(|(n, _)| *n);
        outs.sort_by_key(|(n, _)| *n);

        if ins.is_empty() || outs.is_empty() {
            return Err(JudgeError::TestData(format!(
                "no test data files in {}",
                dir.display()
            )));
        }
        if ins.iter().map(|(n, _)| n).ne(outs.iter().map(|(n, _)| n)) {
            return Err(JudgeError::TestData(
                "input/output test numbering does not match".to_string(),
            ));
        }

        let mut cases = Vec::with_capacity(ins.len());
        for ((n, in_path), (_, out_path)) in ins.into_iter().zip(outs.into_iter()) {
            let input = fs::read_to_string(&in_path)
                .await
                .map_err(|e| JudgeError::TestData(format!("read {}: {e}", in_path.display())))?;
            let expected = fs::read_to_string(&out_path)
                .await
                .map_err(|e| JudgeError::TestData(format!("read {}: {e}", out_path.display())))?;
            cases.push(TestCase {
                number: n,
                input,
                expected,
            });
        }

        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(cases: &[TestCase]) -> Vec<u32> {
        cases.iter().map(|c| c.number).collect()
    }

    #[tokio::test]
    async fn loads_and_sorts_numerically_not_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 10] {
            fs::write(dir.path().join(format!("foo-{n}.in")), format!("in{n}"))
                .await
                .unwrap();
            fs::write(dir.path().join(format!("foo-{n}.out")), format!("out{n}"))
                .await
                .unwrap();
        }

        // Build a provider with an unused S3 client; load_test_files never
        // touches the network.
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "test", "test", None, None, "test",
            ))
            .build();
        let provider = TestDataProvider::new(
            dir.path().to_path_buf(),
            "unused".to_string(),
            S3Client::from_conf(config),
        );

        let cases = provider.load_test_files(dir.path()).await.unwrap();
        assert_eq!(numbers(&cases), vec![1, 2, 10]);
        assert_eq!(cases[2].input, "in10");
    }

    #[tokio::test]
    async fn mismatched_numbering_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a-1.in"), "x").await.unwrap();
        fs::write(dir.path().join("a-2.out"), "y").await.unwrap();

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "test", "test", None, None, "test",
            ))
            .build();
        let provider = TestDataProvider::new(
            dir.path().to_path_buf(),
            "unused".to_string(),
            S3Client::from_conf(config),
        );

        let result = provider.load_test_files(dir.path()).await;
        assert!(result.is_err());
    }
}
