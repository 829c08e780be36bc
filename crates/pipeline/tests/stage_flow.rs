//! Flow tests for the generation stages up to the caption track.
//!
//! Runs narration, audio, image and subtitle generation against the
//! in-memory store with scripted providers, checking that:
//! - Every shot gets exactly one audio clip and one image per version
//! - Partial failures keep finished units and retry only the failed ones
//! - Stages refuse to run, without side effects, until their inputs exist

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use common::{shot_text, Harness, VideoMode};
use storyreel_core::dependencies::{MissingDependency, Stage};
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::ShotKey;
use storyreel_db::store::{AudioStore, ImageStore, NarrationStore, SubtitleStore};
use storyreel_events::names;
use storyreel_pipeline::PipelineError;
use storyreel_storage::BlobStore;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test: narration
// ---------------------------------------------------------------------------

/// Regenerating a narration supersedes the previous one.
#[tokio::test]
async fn narration_regeneration_supersedes() {
    let h = Harness::new(2, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();

    let first = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();
    let second = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.state(), UnitState::Completed);
    let (active, content) = h
        .pipeline
        .narration()
        .completed_for_chapter(chapter_id)
        .await
        .unwrap();
    assert_eq!(active.id, second.id);
    assert_eq!(content.shot_count(), 4);
}

/// Malformed provider output leaves the narration failed.
#[tokio::test]
async fn malformed_narration_is_stored_as_failed() {
    let h = Harness::new(1, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    *h.structuring.output.lock().unwrap() = "not json at all".into();

    let result = h
        .pipeline
        .narration()
        .generate(chapter_id, &CancellationToken::new())
        .await;
    assert_matches!(result, Err(PipelineError::Validation(_)));

    let report = h.pipeline.dependencies().report(chapter_id).await.unwrap();
    let audio = report.iter().find(|r| r.stage == Stage::Audio).unwrap();
    assert!(!audio.ready);
    assert_matches!(
        audio.missing.as_slice(),
        [MissingDependency::NarrationNotCompleted {
            state: UnitState::Failed
        }]
    );
}

// ---------------------------------------------------------------------------
// Test: audio
// ---------------------------------------------------------------------------

/// A 3 scene x 2 shot narration yields six completed clips in shot order.
#[tokio::test]
async fn audio_covers_every_shot() {
    let h = Harness::new(3, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    let mut events = h.events.subscribe();

    let narration = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();
    let report = h
        .pipeline
        .audio()
        .generate_all(narration.id, &cancel)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.completed.len(), 6);
    let keys: Vec<ShotKey> = report.completed.iter().map(|a| a.key()).collect();
    assert_eq!(keys[0], ShotKey::new(1, 1));
    assert_eq!(keys[5], ShotKey::new(3, 2));
    for clip in &report.completed {
        assert_eq!(clip.duration_ms, Some(common::CLIP_MS));
        let key = clip.storage_key.as_deref().unwrap();
        assert!(h.blobs.exists(key).await.unwrap());
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert!(seen.iter().any(|e| e == names::AUDIO_BATCH_FINISHED));

    // A second run finds nothing left to do.
    let again = h
        .pipeline
        .audio()
        .generate_all(narration.id, &cancel)
        .await
        .unwrap();
    assert_eq!(again.completed.len(), 6);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 6);
    assert_eq!(h.store.audio_row_count().await, 6);
}

/// One failing shot leaves the others completed; retrying it alone
/// finishes the set.
#[tokio::test]
async fn partial_audio_failure_then_retry() {
    let h = Harness::new(3, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    h.speech.fail_on(shot_text(2, 1));

    let narration = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();
    let report = h
        .pipeline
        .audio()
        .generate_all(narration.id, &cancel)
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 5);
    assert_eq!(report.failed_shots(), vec![ShotKey::new(2, 1)]);
    assert!(!report.failed[0].retryable);

    let rows = h.store.list_audio(narration.id).await.unwrap();
    let failed: Vec<_> = rows
        .iter()
        .filter(|a| a.state() == UnitState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.as_deref().unwrap().contains("voice unavailable"));

    h.speech.heal();
    let retried = h
        .pipeline
        .audio()
        .retry(narration.id, &report.failed_shots(), &cancel)
        .await
        .unwrap();
    assert!(retried.is_complete());
    assert_eq!(retried.completed.len(), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 7);

    let rows = h.store.list_audio(narration.id).await.unwrap();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|a| a.state() == UnitState::Completed));
}

/// Retrying a shot the narration does not contain is rejected.
#[tokio::test]
async fn retry_rejects_unknown_shot() {
    let h = Harness::new(1, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    let narration = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();

    let result = h
        .pipeline
        .audio()
        .retry(narration.id, &[ShotKey::new(4, 1)], &cancel)
        .await;
    assert_matches!(result, Err(PipelineError::Validation(_)));
}

/// Images cannot be generated before the narration exists.
#[tokio::test]
async fn images_require_narration() {
    let h = Harness::new(1, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;

    let result = h
        .pipeline
        .images()
        .generate_all(chapter_id, &CancellationToken::new())
        .await;
    assert_matches!(
        result,
        Err(PipelineError::Precondition {
            stage: Stage::Image,
            ..
        })
    );
}

// ---------------------------------------------------------------------------
// Test: images
// ---------------------------------------------------------------------------

/// Regenerating images adds a new version per shot and keeps the old one.
#[tokio::test]
async fn image_regeneration_adds_versions() {
    let h = Harness::new(3, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    let narration = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();

    let first = h.pipeline.images().generate_all(chapter_id, &cancel).await.unwrap();
    let second = h.pipeline.images().generate_all(chapter_id, &cancel).await.unwrap();

    assert!(first.completed.iter().all(|i| i.version == 1));
    assert!(second.completed.iter().all(|i| i.version == 2));
    assert_eq!(h.images.calls.load(Ordering::SeqCst), 12);

    let all = h.store.list_images(chapter_id).await.unwrap();
    assert_eq!(all.len(), 12);

    let old = h.store.find_image(first.completed[0].id).await.unwrap().unwrap();
    assert_eq!(old.state(), UnitState::Completed);
    let old_key = old.storage_key.unwrap();
    assert!(h.blobs.exists(&old_key).await.unwrap());
    assert!(old_key.ends_with(".png"));

    let latest = h
        .pipeline
        .images()
        .latest_completed(chapter_id, narration.id)
        .await
        .unwrap();
    assert_eq!(latest.len(), 6);
    assert!(latest.values().all(|i| i.version == 2));
}

/// Two regenerations racing on one chapter still get distinct versions.
#[tokio::test]
async fn concurrent_image_regeneration_allocates_distinct_versions() {
    let h = Harness::new(2, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();

    let images = h.pipeline.images();
    let (a, b) = tokio::join!(
        images.generate_all(chapter_id, &cancel),
        images.generate_all(chapter_id, &cancel)
    );
    assert!(a.unwrap().is_complete());
    assert!(b.unwrap().is_complete());

    let mut versions: HashMap<ShotKey, Vec<i32>> = HashMap::new();
    for image in h.store.list_images(chapter_id).await.unwrap() {
        versions.entry(image.key()).or_default().push(image.version);
    }
    assert_eq!(versions.len(), 4);
    for (_, mut v) in versions {
        v.sort_unstable();
        assert_eq!(v, vec![1, 2]);
    }
}

// ---------------------------------------------------------------------------
// Test: subtitles
// ---------------------------------------------------------------------------

/// Subtitles before audio is a precondition failure with no record.
#[tokio::test]
async fn subtitle_before_audio_is_rejected() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let narration = h
        .pipeline
        .narration()
        .generate(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    let result = h.pipeline.subtitles().generate(narration.id).await;
    assert_matches!(
        result,
        Err(PipelineError::Precondition { stage: Stage::Subtitle, ref missing })
            if missing.len() == 2
    );
    assert_eq!(h.store.subtitle_row_count().await, 0);
    assert!(h
        .store
        .find_active_subtitle(narration.id)
        .await
        .unwrap()
        .is_none());
}

/// Subtitles for a narration that failed report the unmet precondition.
#[tokio::test]
async fn subtitle_on_failed_narration_is_a_precondition() {
    let h = Harness::new(1, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    *h.structuring.output.lock().unwrap() = "not json at all".into();
    let _ = h
        .pipeline
        .narration()
        .generate(chapter_id, &CancellationToken::new())
        .await;
    let narration = h
        .store
        .find_active_narration(chapter_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(narration.state(), UnitState::Failed);

    let result = h.pipeline.subtitles().generate(narration.id).await;
    assert_matches!(
        result,
        Err(PipelineError::Precondition { stage: Stage::Subtitle, ref missing })
            if missing.contains(&MissingDependency::NarrationNotCompleted {
                state: UnitState::Failed
            })
    );
    assert_eq!(h.store.subtitle_row_count().await, 0);
}

/// The caption track is stored as SubRip timed by the audio clips.
#[tokio::test]
async fn subtitle_follows_audio_timing() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    let narration = h.pipeline.narration().generate(chapter_id, &cancel).await.unwrap();
    h.pipeline
        .audio()
        .generate_all(narration.id, &cancel)
        .await
        .unwrap();

    let subtitle = h.pipeline.subtitles().generate(narration.id).await.unwrap();
    assert_eq!(subtitle.state(), UnitState::Completed);

    let key = subtitle.storage_key.as_deref().unwrap();
    let srt = String::from_utf8(h.blobs.download(key).await.unwrap()).unwrap();
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,200\n"));
    assert!(srt.contains("00:00:01,200 --> 00:00:02,400"));
    assert!(srt.contains(&shot_text(2, 1)));
}
