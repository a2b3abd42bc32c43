//! Integration tests for the upload pipeline
//!
//! Sessions run against a scripted in-memory transport with a zero-delay
//! retry policy, so failure and retry paths execute deterministically.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use tiasset::error::{Error, Result};
use tiasset::model::{Envelope, MediaLang, MediaMeta, MediaTag, MediaType, ResponseBody};
use tiasset::retry::RetryPolicy;
use tiasset::transport::Transport;
use tiasset::upload::block::BlockStatus;
use tiasset::upload::{SessionState, UploadSession};
use tiasset::MediaAssets;

const KIB: u64 = 1024;
const BLOCK: u64 = 32 * KIB;

fn meta() -> MediaMeta {
    MediaMeta::new(MediaType::Video, MediaTag::News, None, MediaLang::Mandarin)
}

fn temp_file(size: u64) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    file.write_all(&content).unwrap();
    file.flush().unwrap();
    file
}

fn ok_response(payload: serde_json::Value) -> Result<ResponseBody> {
    let envelope = serde_json::json!({ "Response": payload });
    Envelope::from_slice(&serde_json::to_vec(&envelope).unwrap())?
        .response
        .check()
}

fn transport_unavailable() -> Error {
    Error::Transport {
        status: Some(503),
        message: "service unavailable".to_string(),
    }
}

/// Scripted transport: fails each part a configured number of times, counts
/// attempts, and tracks how many part requests are in flight at once.
#[derive(Default)]
struct MockTransport {
    /// ApplyUpload hands out an upload id (multipart) when true.
    multipart: bool,
    /// ApplyUpload response forces the single-shot path when true.
    force_put_object: bool,
    /// Remaining transport failures to inject, per part number.
    part_failures: Mutex<HashMap<u32, u32>>,
    /// Transport failures to inject into PutObject before succeeding.
    put_failures: AtomicUsize,
    /// Business failures to inject into PutObject before succeeding.
    put_business_failures: AtomicUsize,
    /// Business failure injected into every DescribeMediaDetails call.
    fail_details: bool,
    /// Business failure injected into every ApplyUpload call.
    fail_apply: bool,

    part_attempts: Mutex<HashMap<u32, u32>>,
    put_attempts: AtomicUsize,
    apply_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockTransport {
    fn multipart() -> Self {
        Self {
            multipart: true,
            ..Self::default()
        }
    }

    fn single_shot() -> Self {
        Self::default()
    }

    fn fail_part(self, part: u32, times: u32) -> Self {
        self.part_failures.lock().unwrap().insert(part, times);
        self
    }

    fn attempts_for(&self, part: u32) -> u32 {
        self.part_attempts
            .lock()
            .unwrap()
            .get(&part)
            .copied()
            .unwrap_or(0)
    }

    fn part_number(path_and_query: &str) -> u32 {
        path_and_query
            .split("partNumber=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, action: &str, body: serde_json::Value) -> Result<ResponseBody> {
        assert_eq!(body["Action"], action);
        match action {
            "ApplyUpload" => {
                self.apply_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_apply {
                    return Err(Error::Business {
                        code: "QuotaExceeded".to_string(),
                        message: "project quota exhausted".to_string(),
                        request_id: "req-apply".to_string(),
                    });
                }
                let mut payload = serde_json::json!({
                    "RequestID": "req-apply",
                    "MediaID": 77,
                    "Bucket": "bkt",
                    "Key": "obj",
                });
                if self.multipart {
                    payload["UploadId"] = "up-1".into();
                }
                if self.force_put_object {
                    payload["UsePutObject"] = 1.into();
                }
                ok_response(payload)
            }
            "CommitUpload" => {
                self.commit_calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(body["MediaID"], 77);
                ok_response(serde_json::json!({ "RequestID": "req-commit" }))
            }
            "DescribeMediaDetails" => {
                self.detail_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_details {
                    return Err(Error::Business {
                        code: "NoSuchMedia".to_string(),
                        message: "verification lookup failed".to_string(),
                        request_id: "req-details".to_string(),
                    });
                }
                ok_response(serde_json::json!({
                    "RequestID": "req-details",
                    "MediaInfoSet": [{
                        "MediaID": 77,
                        "Name": "clip",
                        "Status": "上传完成",
                        "DownLoadURL": "/dl/77",
                    }],
                }))
            }
            other => panic!("unexpected gateway action {other}"),
        }
    }

    async fn put(&self, action: &str, path_and_query: &str, body: Bytes) -> Result<ResponseBody> {
        self.queries.lock().unwrap().push(path_and_query.to_string());
        match action {
            "PutObject" => {
                self.put_attempts.fetch_add(1, Ordering::SeqCst);
                if self.put_failures.load(Ordering::SeqCst) > 0 {
                    self.put_failures.fetch_sub(1, Ordering::SeqCst);
                    return Err(transport_unavailable());
                }
                if self.put_business_failures.load(Ordering::SeqCst) > 0 {
                    self.put_business_failures.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::Business {
                        code: "InvalidDigest".to_string(),
                        message: "digest mismatch".to_string(),
                        request_id: "req-put".to_string(),
                    });
                }
                assert!(!body.is_empty());
                ok_response(serde_json::json!({ "RequestID": "req-put" }))
            }
            "UploadPart" => {
                let part = Self::part_number(path_and_query);
                assert!(part > 0, "part number missing in {path_and_query}");
                *self.part_attempts.lock().unwrap().entry(part).or_insert(0) += 1;

                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);
                // Keep the request open long enough for the wave to overlap.
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                let should_fail = {
                    let mut failures = self.part_failures.lock().unwrap();
                    match failures.get_mut(&part) {
                        Some(remaining) if *remaining > 0 => {
                            *remaining -= 1;
                            true
                        }
                        _ => false,
                    }
                };
                if should_fail {
                    return Err(transport_unavailable());
                }
                ok_response(serde_json::json!({ "RequestID": "req-part" }))
            }
            other => panic!("unexpected put action {other}"),
        }
    }

    async fn get(&self, _action: &str, _path_and_query: &str) -> Result<Bytes> {
        Ok(Bytes::from_static(b"content"))
    }
}

fn session<'a>(
    assets: &'a MediaAssets<MockTransport>,
    file: &NamedTempFile,
) -> UploadSession<'a, MockTransport> {
    UploadSession::new(assets, file.path())
        .with_block_size(BLOCK)
        .with_concurrency(4)
        .with_policy(RetryPolicy::immediate(5))
}

#[tokio::test]
async fn test_multipart_all_blocks_succeed_first_round() {
    let assets = MediaAssets::with_transport(MockTransport::multipart(), 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    let info = session.run("clip", &meta()).await.unwrap();

    assert_eq!(session.state(), SessionState::Verified);
    assert_eq!(info.media_id, 77);

    let blocks = session.blocks();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].length, 32 * KIB);
    assert_eq!(blocks[1].length, 32 * KIB);
    assert_eq!(blocks[2].length, 6 * KIB);
    assert!(blocks.iter().all(|b| b.status == BlockStatus::Succeeded));

    let mock = assets.transport();
    for part in 1..=3 {
        assert_eq!(mock.attempts_for(part), 1);
    }
    assert_eq!(mock.commit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.detail_calls.load(Ordering::SeqCst), 1);
    // Concurrency clamps to the block count.
    assert!(mock.max_in_flight.load(Ordering::SeqCst) <= 3);

    let queries = mock.queries.lock().unwrap();
    assert!(queries[0].starts_with(
        "/FileManager/UploadPart?useJson=true&Bucket=bkt&Key=obj&uploadId=up-1&partNumber="
    ));
    assert!(queries[0].contains("Content-MD5="));
}

#[tokio::test]
async fn test_straggler_block_retried_alone() {
    let assets =
        MediaAssets::with_transport(MockTransport::multipart().fail_part(2, 2), 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    session.run("clip", &meta()).await.unwrap();

    assert_eq!(session.state(), SessionState::Verified);

    let mock = assets.transport();
    // Blocks 1 and 3 stay Succeeded from round 1 and are never re-sent.
    assert_eq!(mock.attempts_for(1), 1);
    assert_eq!(mock.attempts_for(3), 1);
    assert_eq!(mock.attempts_for(2), 3);
    assert_eq!(mock.commit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_permanently_failing_block_fails_session_without_commit() {
    let assets =
        MediaAssets::with_transport(MockTransport::multipart().fail_part(1, u32::MAX), 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    let err = session.run("clip", &meta()).await.unwrap_err();

    assert_eq!(session.state(), SessionState::Failed);
    // The terminal error is the failing block's last transport error.
    assert_eq!(err.code(), "503");

    let mock = assets.transport();
    assert_eq!(mock.attempts_for(1), 5);
    assert_eq!(mock.attempts_for(2), 1);
    assert_eq!(mock.attempts_for(3), 1);
    assert_eq!(mock.commit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(mock.detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrency_bound_holds_across_waves() {
    let assets = MediaAssets::with_transport(MockTransport::multipart(), 1, 1);
    // 8 full blocks, 3 workers.
    let file = temp_file(8 * BLOCK);

    let mut session = UploadSession::new(&assets, file.path())
        .with_block_size(BLOCK)
        .with_concurrency(3)
        .with_policy(RetryPolicy::immediate(5));
    session.run("clip", &meta()).await.unwrap();

    let mock = assets.transport();
    assert!(mock.max_in_flight.load(Ordering::SeqCst) <= 3);
    for part in 1..=8 {
        assert_eq!(mock.attempts_for(part), 1);
    }
}

#[tokio::test]
async fn test_small_file_routes_to_single_shot() {
    let assets = MediaAssets::with_transport(MockTransport::single_shot(), 1, 1);
    let file = temp_file(5 * KIB);

    let mut session = session(&assets, &file);
    session.run("clip", &meta()).await.unwrap();

    assert_eq!(session.state(), SessionState::Verified);
    let mock = assets.transport();
    assert_eq!(mock.put_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(mock.attempts_for(1), 0);
    assert_eq!(mock.commit_calls.load(Ordering::SeqCst), 1);

    let queries = mock.queries.lock().unwrap();
    assert!(queries[0].starts_with("/FileManager/PutObject?useJson=true&Bucket=bkt&Key=obj"));
    assert!(!queries[0].contains("uploadId"));
}

#[tokio::test]
async fn test_service_forces_single_shot_for_large_file() {
    let mut mock = MockTransport::single_shot();
    mock.force_put_object = true;
    let assets = MediaAssets::with_transport(mock, 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    session.run("clip", &meta()).await.unwrap();

    let mock = assets.transport();
    assert_eq!(mock.put_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(mock.attempts_for(1), 0);
}

#[tokio::test]
async fn test_single_shot_retries_transport_and_business_failures() {
    let mock = MockTransport::single_shot();
    mock.put_failures.store(2, Ordering::SeqCst);
    mock.put_business_failures.store(1, Ordering::SeqCst);
    let assets = MediaAssets::with_transport(mock, 1, 1);
    let file = temp_file(5 * KIB);

    let mut session = session(&assets, &file);
    session.run("clip", &meta()).await.unwrap();

    assert_eq!(session.state(), SessionState::Verified);
    assert_eq!(assets.transport().put_attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_single_shot_budget_exhaustion_fails_session() {
    let mock = MockTransport::single_shot();
    mock.put_failures.store(u32::MAX as usize, Ordering::SeqCst);
    let assets = MediaAssets::with_transport(mock, 1, 1);
    let file = temp_file(5 * KIB);

    let mut session = session(&assets, &file);
    let err = session.run("clip", &meta()).await.unwrap_err();

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(err.code(), "503");
    assert_eq!(assets.transport().put_attempts.load(Ordering::SeqCst), 5);
    assert_eq!(assets.transport().commit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file_fails_before_any_network_call() {
    let assets = MediaAssets::with_transport(MockTransport::multipart(), 1, 1);

    let mut session = UploadSession::new(&assets, "/no/such/file.mp4")
        .with_policy(RetryPolicy::immediate(5));
    let err = session.run("clip", &meta()).await.unwrap_err();

    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(err, Error::FileAccess { .. }));
    assert_eq!(assets.transport().apply_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_apply_business_error_is_fatal_without_retry() {
    let mut mock = MockTransport::multipart();
    mock.fail_apply = true;
    let assets = MediaAssets::with_transport(mock, 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    let err = session.run("clip", &meta()).await.unwrap_err();

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(err.code(), "QuotaExceeded");
    let mock = assets.transport();
    assert_eq!(mock.apply_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.attempts_for(1), 0);
}

#[tokio::test]
async fn test_verification_failure_is_terminal_after_commit() {
    let mut mock = MockTransport::multipart();
    mock.fail_details = true;
    let assets = MediaAssets::with_transport(mock, 1, 1);
    let file = temp_file(70 * KIB);

    let mut session = session(&assets, &file);
    let err = session.run("clip", &meta()).await.unwrap_err();

    // Bytes were transferred and committed, yet the session still fails.
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(err.code(), "NoSuchMedia");
    assert_eq!(assets.transport().commit_calls.load(Ordering::SeqCst), 1);
}
