//! Streaming job consumer tests
//!
//! Chunk boundaries, malformed lines, truncation and ETA reporting.

mod helpers;

use bytes::Bytes;
use helpers::{done_line, failed_line};
use pulsemix_client::job::{JobUpdate, StreamingJobConsumer};
use pulsemix_client::{ArtifactStore, SlotState};
use pulsemix_common::VersionId;
use std::time::{Duration, Instant};

fn full_body() -> String {
    format!(
        "{}{}{}{}",
        done_line("v1", 1, "héartbeat-1".as_bytes()),
        "{\"version\":\"v2\",\"status\":\"mixing\",\"progress\":\"1/4\"}\n",
        failed_line("v3", "render error"),
        done_line("v4", 2, &[0u8, 255, 128, 7]),
    )
}

fn consume_split(body: &[u8], split: usize) -> (Vec<JobUpdate>, ArtifactStore) {
    let start = Instant::now();
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", start);
    let (a, b) = body.split_at(split);
    let mut updates = consumer.feed(a, &mut store, start);
    updates.extend(consumer.feed(b, &mut store, start));
    let (rest, _) = consumer.finish(&mut store, start, None);
    updates.extend(rest);
    (updates, store)
}

#[test]
fn test_every_split_offset_yields_identical_updates() {
    let body = full_body();
    let bytes = body.as_bytes();
    let (expected, expected_store) = consume_split(bytes, bytes.len());
    assert_eq!(expected.len(), 3);

    for split in 0..=bytes.len() {
        let (updates, store) = consume_split(bytes, split);
        assert_eq!(updates, expected, "split at byte {}", split);
        for version in VersionId::ALL {
            assert_eq!(store.state(version), expected_store.state(version), "split at byte {}", split);
            assert_eq!(store.get(version), expected_store.get(version), "split at byte {}", split);
        }
    }
}

#[test]
fn test_split_inside_multibyte_character() {
    // Records are plain JSON, so put a multi-byte character inside a reason
    let body = format!("{}{}", failed_line("v2", "débordement"), done_line("v1", 1, b"ok"));
    let bytes = body.as_bytes();
    let split = body.find('é').unwrap() + 1;
    assert!(!body.is_char_boundary(split));

    let (updates, store) = consume_split(bytes, split);
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[0],
        JobUpdate::SlotFailed {
            version: VersionId::V2,
            reason: "débordement".to_string()
        }
    );
    assert!(store.is_ready(VersionId::V1));
}

#[test]
fn test_malformed_middle_line_is_dropped() {
    let body = format!(
        "{}{}\n{}{}",
        done_line("v1", 1, b"one"),
        "{\"version\":\"v2\",\"status\":",
        "not json at all\n",
        done_line("v3", 2, b"three"),
    );
    let start = Instant::now();
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", start);

    let updates = consumer.feed(body.as_bytes(), &mut store, start);

    assert_eq!(updates.len(), 2);
    assert!(store.is_ready(VersionId::V1));
    assert_eq!(store.state(VersionId::V2), SlotState::Pending);
    assert!(store.is_ready(VersionId::V3));
}

#[tokio::test]
async fn test_read_error_leaves_unreported_slots_pending() {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(done_line("v1", 1, b"one"))),
        Ok(Bytes::from(failed_line("v2", "timeout"))),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
        Ok(Bytes::from(done_line("v3", 2, b"never read"))),
    ];
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", Instant::now());
    let mut seen = Vec::new();

    let summary = consumer
        .consume(futures::stream::iter(chunks), &mut store, |update| seen.push(update.clone()))
        .await;

    assert_eq!(seen.len(), 2);
    assert_eq!(summary.ready, vec![VersionId::V1]);
    assert_eq!(summary.failed, vec![VersionId::V2]);
    assert_eq!(summary.pending, vec![VersionId::V3, VersionId::V4]);
    assert!(summary.is_truncated());
    assert!(summary.read_error.unwrap().contains("reset by peer"));
    assert!(store.get(VersionId::V3).is_none());
}

#[tokio::test]
async fn test_clean_end_without_trailing_newline() {
    let body = full_body();
    let trimmed = body.trim_end().to_string();
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Ok(Bytes::from(trimmed))];
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", Instant::now());

    let summary = consumer.consume(futures::stream::iter(chunks), &mut store, |_| {}).await;

    assert_eq!(summary.ready, vec![VersionId::V1, VersionId::V4]);
    assert_eq!(summary.failed, vec![VersionId::V3]);
    assert_eq!(summary.pending, vec![VersionId::V2]);
    assert_eq!(summary.read_error, None);
}

#[test]
fn test_excess_records_are_tolerated() {
    let start = Instant::now();
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", start);
    let mut body = String::new();
    for (n, v) in ["v1", "v2", "v3", "v4"].iter().enumerate() {
        body.push_str(&done_line(v, n as u32 + 1, v.as_bytes()));
    }
    // A fifth outcome for an already-settled slot
    body.push_str(&failed_line("v2", "late failure"));

    let updates = consumer.feed(body.as_bytes(), &mut store, start);

    assert_eq!(updates.len(), 4);
    assert_eq!(store.ready_keys(), VersionId::ALL.to_vec());
    assert_eq!(store.get(VersionId::V2).unwrap().bytes.as_ref(), b"v2");
}

#[test]
fn test_eta_is_linear_in_completed_slots() {
    let start = Instant::now();
    let mut store = ArtifactStore::new();
    let mut consumer = StreamingJobConsumer::new("audio/mpeg", start);

    let first = consumer.feed(done_line("v1", 1, b"a").as_bytes(), &mut store, start + Duration::from_secs(4));
    let second = consumer.feed(done_line("v2", 2, b"b").as_bytes(), &mut store, start + Duration::from_secs(10));

    assert_eq!(
        first,
        vec![JobUpdate::SlotReady {
            version: VersionId::V1,
            done: 1,
            total: 4,
            eta: Some(Duration::from_secs(12)),
        }]
    );
    assert_eq!(
        second,
        vec![JobUpdate::SlotReady {
            version: VersionId::V2,
            done: 2,
            total: 4,
            eta: Some(Duration::from_secs(10)),
        }]
    );
}
