mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use towebp_codec::{Codec, CodecError, FnCodec};
use towebp_core::format::EncodeParams;
use towebp_core::report::{RowStatus, SettledOutcome, TaskError};
use towebp_core::task::SourceFile;
use towebp_events::BatchEvent;
use towebp_pipeline::{PipelineHandle, DEFAULT_ARCHIVE_NAME};

// ---------------------------------------------------------------------------
// Aggregate outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mixed_batch_reports_partial_success() {
    let pipeline = start(2, table_codec());

    pipeline
        .admit(vec![png("a.png", 100), png("b.png", 200), png("c.png", 50)])
        .await
        .unwrap();
    let progress = pipeline.wait_idle().await.unwrap();

    let stats = progress.stats;
    assert_eq!(stats.completed_count, 2);
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.target_file_count, 3);
    assert_eq!(stats.total_original_bytes_completed, 150);
    assert_eq!(stats.total_output_bytes_completed, 50);
    assert!(stats.is_conserved());
    assert!(stats.is_done());

    let snapshot = pipeline.snapshot().await.unwrap();
    assert_matches!(snapshot.rows[0].status, RowStatus::Done { new_size: 40, .. });
    assert_matches!(
        &snapshot.rows[1].status,
        RowStatus::Failed { error: TaskError::Decode(_) }
    );
    assert_matches!(snapshot.rows[2].status, RowStatus::Done { new_size: 10, .. });

    pipeline.shutdown().await;
}

#[tokio::test]
async fn every_task_settles_exactly_once() {
    let pipeline = start(3, table_codec());
    let mut events = pipeline.subscribe();

    let files: Vec<_> = (0..40).map(|i| png(&format!("{i}.png"), 10 + i)).collect();
    pipeline.admit(files).await.unwrap();
    pipeline.wait_idle().await.unwrap();

    let mut settled = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BatchEvent::TaskSettled(settlement) = event {
            settled.push(settlement.task_id);
        }
    }
    settled.sort_unstable();
    settled.dedup();
    assert_eq!(settled.len(), 40);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn progress_events_always_conserve_tasks() {
    let pipeline = start(2, table_codec());
    let mut events = pipeline.subscribe();

    let files: Vec<_> = (0..60).map(|i| png(&format!("{i}.png"), 20)).collect();
    pipeline.admit(files).await.unwrap();
    pipeline.wait_idle().await.unwrap();
    // Let the final render tick publish.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut seen = 0;
    while let Ok(event) = events.try_recv() {
        if let BatchEvent::Progress(progress) = event {
            assert!(progress.stats.is_conserved(), "{:?}", progress.stats);
            assert!(progress.stats.completed_count <= progress.stats.target_file_count);
            seen += 1;
        }
    }
    assert!(seen > 0);

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_inputs_counted_once_across_batches() {
    let pipeline = start(2, table_codec());

    let first = pipeline
        .admit(vec![png("a.png", 10), png("b.png", 12)])
        .await
        .unwrap();
    let second = pipeline
        .admit(vec![png("a.png", 10), png("c.png", 14)])
        .await
        .unwrap();

    assert_eq!(first.admitted, 2);
    assert_eq!((second.admitted, second.duplicates), (1, 1));
    assert_eq!(second.expected_file_count, 3);

    let progress = pipeline.wait_idle().await.unwrap();
    assert_eq!(progress.stats.target_file_count, 3);
    assert_eq!(pipeline.snapshot().await.unwrap().rows.len(), 3);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn ten_thousand_inputs_never_exceed_backpressure_ceiling() {
    let pipeline = start(4, table_codec());
    let mut events = pipeline.subscribe();

    let files: Vec<_> = (0..10_000).map(|i| png(&format!("{i}.png"), 8)).collect();
    let report = pipeline.admit(files).await.unwrap();
    assert_eq!(report.admitted, 10_000);

    let progress = pipeline.wait_idle().await.unwrap();
    assert_eq!(progress.stats.target_file_count, 10_000);
    assert_eq!(progress.stats.completed_count, 10_000);
    assert!(progress.stats.peak_queue_depth <= 8);

    while let Ok(event) = events.try_recv() {
        if let BatchEvent::Progress(progress) = event {
            assert!(progress.stats.queue_depth <= 8);
        }
    }

    pipeline.shutdown().await;
}

#[tokio::test]
async fn wait_idle_on_empty_pipeline_returns_immediately() {
    let pipeline = start(2, table_codec());
    let progress = pipeline.wait_idle().await.unwrap();
    assert_eq!(progress.stats.expected_file_count, 0);
    assert_eq!(progress.generation, 0);
    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Pool exclusivity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_encodes_never_exceed_pool_size() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
    let codec: Arc<dyn Codec> = Arc::new(FnCodec::new(move |input: &[u8], _: &EncodeParams| {
        let now = r.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        r.fetch_sub(1, Ordering::SeqCst);
        Ok(input.to_vec())
    }));

    let pipeline = start(3, codec);
    let files: Vec<_> = (0..30).map(|i| png(&format!("{i}.png"), 4)).collect();
    pipeline.admit(files).await.unwrap();
    pipeline.wait_idle().await.unwrap();

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn failures_do_not_disable_workers() {
    let codec: Arc<dyn Codec> = Arc::new(FnCodec::new(|input: &[u8], _: &EncodeParams| {
        if input.len() % 2 == 1 {
            Err(CodecError::Encode("odd input".into()))
        } else {
            Ok(vec![0u8; 1])
        }
    }));
    let pipeline = start(1, codec);

    let files: Vec<_> = (0..10).map(|i| png(&format!("{i}.png"), 10 + i)).collect();
    pipeline.admit(files).await.unwrap();
    let progress = pipeline.wait_idle().await.unwrap();

    assert_eq!(progress.stats.completed_count, 5);
    assert_eq!(progress.stats.error_count, 5);

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Fallback routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn vector_inputs_complete_on_fallback_path() {
    let pipeline = start(2, table_codec());

    pipeline
        .admit(vec![svg("logo.svg"), png("a.png", 100)])
        .await
        .unwrap();
    let progress = pipeline.wait_idle().await.unwrap();

    assert_eq!(progress.stats.completed_count, 2);
    let results = pipeline.results().await.unwrap();
    assert_eq!(results[0].output_name, "logo.webp");
    assert_eq!(results[1].output_name, "a.webp");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn all_vector_batch_stays_under_backpressure_ceiling() {
    let fallback_codec: Arc<dyn Codec> = Arc::new(FnCodec::new(|input: &[u8], _: &EncodeParams| {
        std::thread::sleep(Duration::from_millis(5));
        Ok(input.to_vec())
    }));
    let pipeline = PipelineHandle::builder(config(2), table_codec())
        .fallback_codec(fallback_codec)
        .start();

    let files: Vec<_> = (0..400)
        .map(|i| SourceFile::new(format!("{i}.svg"), "image/svg+xml", 0, b"<svg/>".to_vec()))
        .collect();
    assert_eq!(pipeline.admit(files).await.unwrap().admitted, 400);

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(15)).await;
        let stats = pipeline.progress().await.unwrap().stats;
        assert!(stats.in_flight_count <= 4, "{stats:?}");
        assert!(stats.target_file_count - stats.settled_count() <= 4, "{stats:?}");
        assert!(stats.is_conserved(), "{stats:?}");
    }

    let progress = pipeline.wait_idle().await.unwrap();
    assert_eq!(progress.stats.completed_count, 400);
    assert_eq!(progress.stats.target_file_count, 400);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn worker_bounces_unsupported_input_to_fallback() {
    let pool_codec: Arc<dyn Codec> = Arc::new(FnCodec::new(|input: &[u8], _: &EncodeParams| {
        if input.starts_with(b"<") {
            Err(CodecError::UnsupportedInput("markup".into()))
        } else {
            Ok(vec![0u8; 2])
        }
    }));
    let fallback_codec: Arc<dyn Codec> =
        Arc::new(FnCodec::new(|_: &[u8], _: &EncodeParams| Ok(vec![0u8; 5])));

    let pipeline = PipelineHandle::builder(config(1), pool_codec)
        .fallback_codec(fallback_codec)
        .start();
    let mut events = pipeline.subscribe();

    let disguised = SourceFile::new("odd.png", "image/png", 0, b"<svg/>".to_vec());
    pipeline.admit(vec![disguised, png("b.png", 10)]).await.unwrap();
    let progress = pipeline.wait_idle().await.unwrap();
    assert_eq!(progress.stats.completed_count, 2);

    let mut sizes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BatchEvent::TaskSettled(settlement) = event {
            if let SettledOutcome::Completed { output_name, new_size, .. } = settlement.outcome {
                sizes.push((output_name, new_size));
            }
        }
    }
    sizes.sort();
    assert_eq!(sizes, vec![("b.webp".to_string(), 2), ("odd.webp".to_string(), 5)]);

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Ordering and export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_follow_submission_order_not_completion_order() {
    // Larger inputs finish sooner, so completion order is reversed.
    let codec: Arc<dyn Codec> = Arc::new(FnCodec::new(|input: &[u8], _: &EncodeParams| {
        let delay = 40u64.saturating_sub(input.len() as u64);
        std::thread::sleep(Duration::from_millis(delay));
        Ok(input.to_vec())
    }));
    let pipeline = start(4, codec);

    pipeline
        .admit(vec![
            png("first.png", 5),
            png("second.png", 15),
            png("third.png", 25),
            png("fourth.png", 35),
        ])
        .await
        .unwrap();
    pipeline.wait_idle().await.unwrap();

    let names: Vec<_> = pipeline
        .results()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.output_name)
        .collect();
    assert_eq!(names, vec!["first.webp", "second.webp", "third.webp", "fourth.webp"]);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn export_archive_contains_every_output() {
    let pipeline = start(2, table_codec());
    assert!(pipeline.export_archive().await.is_err());

    pipeline
        .admit(vec![png("a.png", 100), png("b.png", 200), png("c.png", 50)])
        .await
        .unwrap();
    pipeline.wait_idle().await.unwrap();

    let zip = pipeline.export_archive().await.unwrap();
    assert_eq!(&zip[..2], b"PK");
    assert_eq!(DEFAULT_ARCHIVE_NAME, "converted_images.zip");

    let one = pipeline.results().await.unwrap()[0].task_id;
    assert!(pipeline.result(one).await.unwrap().is_some());
    assert!(pipeline.result(9_999).await.unwrap().is_none());

    pipeline.shutdown().await;
}
