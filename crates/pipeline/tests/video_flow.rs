//! Flow tests for narration and final video assembly.
//!
//! Verifies that:
//! - One narration video is rendered per scene, in scene order
//! - Jobs that fail, time out or are cancelled leave their video `failed`
//! - The final video concatenates the narration videos and the closing clip
//! - A full chapter run stops cleanly where preconditions run out

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{Harness, VideoMode, OUTRO_KEY};
use storyreel_core::dependencies::{MissingDependency, Stage};
use storyreel_core::lifecycle::UnitState;
use storyreel_core::types::DbId;
use storyreel_db::models::status::VideoType;
use storyreel_db::store::VideoStore;
use storyreel_pipeline::{ErrorKind, PipelineError};
use storyreel_providers::VideoJobRequest;
use storyreel_storage::BlobStore;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run every stage up to the caption track and return the chapter id.
async fn prepared_chapter(h: &Harness) -> DbId {
    let chapter_id = h.chapter().await;
    let cancel = CancellationToken::new();
    let narration = h
        .pipeline
        .narration()
        .generate(chapter_id, &cancel)
        .await
        .unwrap();
    h.pipeline
        .audio()
        .generate_all(narration.id, &cancel)
        .await
        .unwrap();
    h.pipeline
        .images()
        .generate_all(chapter_id, &cancel)
        .await
        .unwrap();
    h.pipeline.subtitles().generate(narration.id).await.unwrap();
    chapter_id
}

async fn narration_video_states(h: &Harness, chapter_id: DbId) -> Vec<UnitState> {
    h.store
        .list_active_videos(chapter_id, VideoType::NarrationVideo)
        .await
        .unwrap()
        .iter()
        .map(|v| v.state())
        .collect()
}

// ---------------------------------------------------------------------------
// Test: narration videos
// ---------------------------------------------------------------------------

/// Each scene becomes one completed narration video stored in the blob store.
#[tokio::test]
async fn narration_videos_follow_scene_order() {
    let h = Harness::new(3, 2, VideoMode::Complete);
    let chapter_id = prepared_chapter(&h).await;

    let report = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    let sequences: Vec<i32> = report.completed.iter().map(|v| v.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    for video in &report.completed {
        assert_eq!(video.state(), UnitState::Completed);
        let key = video.storage_key.as_deref().unwrap();
        assert!(h.blobs.exists(key).await.unwrap());
    }

    let submitted = h.video.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 3);
    let segment_counts: Vec<usize> = submitted
        .iter()
        .map(|r| match r {
            VideoJobRequest::NarrationClip { segments, .. } => segments.len(),
            VideoJobRequest::Concatenate { .. } => 0,
        })
        .collect();
    assert_eq!(segment_counts, vec![2, 2, 2]);
}

/// Fewer than two completed images blocks narration videos.
#[tokio::test]
async fn narration_video_needs_two_images() {
    let h = Harness::new(1, 1, VideoMode::Complete);
    let chapter_id = prepared_chapter(&h).await;

    let result = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &CancellationToken::new())
        .await;
    assert_matches!(
        result,
        Err(PipelineError::Precondition { stage: Stage::NarrationVideo, ref missing })
            if missing.contains(&MissingDependency::Images { required: 2, completed: 1 })
    );
    assert_eq!(h.store.video_row_count().await, 0);
    assert_eq!(h.video.submitted_count(), 0);
}

/// A job that never finishes times out and its video is marked failed.
#[tokio::test]
async fn stuck_job_times_out() {
    let h = Harness::new(2, 1, VideoMode::Never);
    let chapter_id = prepared_chapter(&h).await;

    let report = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].sequence, Some(1));
    assert!(report.failed[0].message.contains("timed out"));

    let videos = h
        .store
        .list_active_videos(chapter_id, VideoType::NarrationVideo)
        .await
        .unwrap();
    assert!(videos.iter().all(|v| v.state() == UnitState::Failed));
    assert!(videos
        .iter()
        .all(|v| v.error_message.as_deref().unwrap_or("").contains("timed out")));
}

/// A provider-side failure is stored on the video.
#[tokio::test]
async fn failed_job_marks_video_failed() {
    let h = Harness::new(2, 1, VideoMode::Fail);
    let chapter_id = prepared_chapter(&h).await;

    let report = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.message.contains("encoder crashed")));
    assert_eq!(
        narration_video_states(&h, chapter_id).await,
        vec![UnitState::Failed, UnitState::Failed]
    );
}

/// Cancelling mid-poll fails every in-flight video and reports the cancel.
#[tokio::test]
async fn cancellation_fails_in_flight_videos() {
    let h = Harness::new(2, 1, VideoMode::Never);
    let chapter_id = prepared_chapter(&h).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let result = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &cancel)
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(
        narration_video_states(&h, chapter_id).await,
        vec![UnitState::Failed, UnitState::Failed]
    );
}

/// Regenerating narration videos replaces the previous set.
#[tokio::test]
async fn regenerating_narration_videos_replaces_previous() {
    let h = Harness::new(2, 1, VideoMode::Fail);
    let chapter_id = prepared_chapter(&h).await;
    let cancel = CancellationToken::new();

    h.pipeline
        .videos()
        .generate_narration_videos(chapter_id, &cancel)
        .await
        .unwrap();
    h.video.set_mode(VideoMode::Complete);
    let report = h
        .pipeline
        .videos()
        .generate_narration_videos(chapter_id, &cancel)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(
        narration_video_states(&h, chapter_id).await,
        vec![UnitState::Completed, UnitState::Completed]
    );
    assert_eq!(h.store.video_row_count().await, 4);
}

// ---------------------------------------------------------------------------
// Test: resume
// ---------------------------------------------------------------------------

/// A video left `processing` can be resumed and completes.
#[tokio::test]
async fn resume_completes_processing_video() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    let video = h
        .store
        .replace_videos(chapter_id, 7, VideoType::NarrationVideo, &[1])
        .await
        .unwrap()
        .remove(0);
    h.store.start_video(video.id, "job-orphan").await.unwrap();

    let resumed = h
        .pipeline
        .videos()
        .resume(video.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resumed.state(), UnitState::Completed);

    // Only processing videos can be resumed.
    assert_matches!(
        h.pipeline
            .videos()
            .resume(video.id, &CancellationToken::new())
            .await,
        Err(PipelineError::Conflict(_))
    );
}

// ---------------------------------------------------------------------------
// Test: final video
// ---------------------------------------------------------------------------

/// Without a stored closing clip the final video cannot run.
#[tokio::test]
async fn final_video_requires_outro() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = prepared_chapter(&h).await;
    let cancel = CancellationToken::new();
    h.pipeline
        .videos()
        .generate_narration_videos(chapter_id, &cancel)
        .await
        .unwrap();

    let result = h
        .pipeline
        .videos()
        .generate_final_video(chapter_id, &cancel)
        .await;
    assert_matches!(
        result,
        Err(PipelineError::Precondition { stage: Stage::FinalVideo, ref missing })
            if missing == &vec![MissingDependency::OutroAsset]
    );
}

/// The final video concatenates narration videos in order, then the outro.
#[tokio::test]
async fn final_video_appends_outro() {
    let h = Harness::new(3, 1, VideoMode::Complete);
    let chapter_id = prepared_chapter(&h).await;
    h.seed_outro().await;
    let cancel = CancellationToken::new();
    h.pipeline
        .videos()
        .generate_narration_videos(chapter_id, &cancel)
        .await
        .unwrap();

    let video = h
        .pipeline
        .videos()
        .generate_final_video(chapter_id, &cancel)
        .await
        .unwrap();
    assert_eq!(video.state(), UnitState::Completed);
    assert_eq!(video.sequence, 1);

    let submitted = h.video.submitted.lock().unwrap().clone();
    let inputs = match submitted.last() {
        Some(VideoJobRequest::Concatenate { inputs }) => inputs.clone(),
        other => panic!("expected a concatenate job, got {other:?}"),
    };
    assert_eq!(inputs.len(), 4);
    assert!(inputs[3].contains(OUTRO_KEY));
}

// ---------------------------------------------------------------------------
// Test: full chapter run
// ---------------------------------------------------------------------------

/// With everything in place a chapter run ends with a final video.
#[tokio::test]
async fn chapter_run_reaches_final_video() {
    let h = Harness::new(2, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    h.seed_outro().await;

    let run = h
        .pipeline
        .run_chapter(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.audio.completed.len(), 4);
    assert_eq!(run.images.completed.len(), 4);
    assert!(run.subtitle.is_some());
    assert_eq!(run.narration_videos.as_ref().unwrap().completed.len(), 2);
    assert_eq!(
        run.final_video.as_ref().map(|v| v.state()),
        Some(UnitState::Completed)
    );
}

/// Failed audio stops the run before subtitles without an error.
#[tokio::test]
async fn chapter_run_stops_on_failed_audio() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    h.speech.fail_on(common::shot_text(1, 1));

    let run = h
        .pipeline
        .run_chapter(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.audio.failed.len(), 1);
    assert!(run.subtitle.is_none());
    assert!(run.narration_videos.is_none());
    assert_eq!(h.video.submitted_count(), 0);
}

/// Regenerating the narration retires videos cut from the old scenes, so
/// the final video is only rebuilt from the new narration.
#[tokio::test]
async fn narration_regeneration_retires_videos() {
    let h = Harness::new(3, 2, VideoMode::Complete);
    let chapter_id = h.chapter().await;
    h.seed_outro().await;
    let cancel = CancellationToken::new();
    let first = h.pipeline.run_chapter(chapter_id, &cancel).await.unwrap();
    assert!(first.final_video.is_some());

    *h.structuring.output.lock().unwrap() = common::narration_document(2, 1);
    h.pipeline
        .narration()
        .generate(chapter_id, &cancel)
        .await
        .unwrap();

    assert_matches!(
        h.pipeline
            .dependencies()
            .can_run(Stage::FinalVideo, chapter_id)
            .await,
        Err(PipelineError::Precondition { stage: Stage::FinalVideo, ref missing })
            if missing.contains(&MissingDependency::NarrationVideos)
    );
    for video_type in [VideoType::NarrationVideo, VideoType::FinalVideo] {
        let active = h.store.list_active_videos(chapter_id, video_type).await.unwrap();
        assert!(active.is_empty());
    }

    let second = h.pipeline.run_chapter(chapter_id, &cancel).await.unwrap();
    assert_eq!(second.narration_videos.as_ref().unwrap().completed.len(), 2);
    assert!(second.final_video.is_some());
    let submitted = h.video.submitted.lock().unwrap().clone();
    let inputs = match submitted.last() {
        Some(VideoJobRequest::Concatenate { inputs }) => inputs.clone(),
        other => panic!("expected a concatenate job, got {other:?}"),
    };
    assert_eq!(inputs.len(), 3);
}

/// Without the closing clip the run ends after the narration videos.
#[tokio::test]
async fn chapter_run_skips_final_without_outro() {
    let h = Harness::new(2, 1, VideoMode::Complete);
    let chapter_id = h.chapter().await;

    let run = h
        .pipeline
        .run_chapter(chapter_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(run.narration_videos.as_ref().unwrap().is_complete());
    assert!(run.final_video.is_none());
}
