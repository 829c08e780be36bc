//! Integration tests for the PostgreSQL store.
//!
//! Exercises the repository layer against a real database to verify that:
//! - Chapters are inserted densely and only once per novel
//! - Narration regeneration leaves exactly one active row per chapter
//! - Image versions are allocated per shot key and never collide
//! - Guarded status updates reject illegal transitions
//!
//! These need a reachable `DATABASE_URL` and are ignored by default:
//! `cargo test -p storyreel-db -- --ignored`.

use assert_matches::assert_matches;
use sqlx::PgPool;
use storyreel_core::chaptering::ChapterDraft;
use storyreel_core::lifecycle::UnitState;
use storyreel_core::narration::ShotKey;
use storyreel_db::models::novel::CreateNovel;
use storyreel_db::models::resource::CreateResource;
use storyreel_db::models::status::{ResourceStatus, VideoType};
use storyreel_db::store::{
    AudioStore, ChapterStore, ImageStore, NarrationStore, NovelStore, PgStore, ResourceStore,
    StoreError, VideoStore,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn drafts(n: usize) -> Vec<ChapterDraft> {
    (1..=n)
        .map(|i| ChapterDraft {
            sequence: i as i32,
            title: format!("Chapter {i}"),
            text: format!("Body of chapter {i}.\n"),
        })
        .collect()
}

async fn seed_novel(store: &PgStore) -> i64 {
    let resource = store
        .create_resource(&CreateResource {
            user_id: 1,
            name: "novel".into(),
            ext: "txt".into(),
            file_size: 0,
            content_type: "text/plain".into(),
            storage_key: "resources/1/novel.txt".into(),
            storage_type: "local".into(),
        })
        .await
        .unwrap();
    store
        .mark_resource(resource.id, ResourceStatus::Ready, Some(42))
        .await
        .unwrap();
    store
        .create_novel(&CreateNovel {
            resource_id: resource.id,
            user_id: 1,
            style: None,
            narration_type: None,
        })
        .await
        .unwrap()
        .id
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_chapters_are_dense_and_created_once(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;

    let chapters = store.create_chapters(novel_id, 1, &drafts(4)).await.unwrap();
    let sequences: Vec<i32> = chapters.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    assert_matches!(
        store.create_chapters(novel_id, 1, &drafts(2)).await,
        Err(StoreError::Conflict(_))
    );
    assert_eq!(store.list_chapters(novel_id).await.unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Narrations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_supersede_keeps_one_active_narration(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;
    let chapter = store.create_chapters(novel_id, 1, &drafts(1)).await.unwrap()[0].clone();

    let first = store.supersede_narration(chapter.id, 1).await.unwrap();
    let second = store.supersede_narration(chapter.id, 1).await.unwrap();

    let active = store
        .find_active_narration(chapter.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, second.id);
    assert!(store.find_narration(first.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_supersede_retires_chapter_videos(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;
    let chapter = store.create_chapters(novel_id, 1, &drafts(1)).await.unwrap()[0].clone();

    store.supersede_narration(chapter.id, 1).await.unwrap();
    store
        .replace_videos(chapter.id, 1, VideoType::NarrationVideo, &[1, 2])
        .await
        .unwrap();
    store
        .replace_videos(chapter.id, 1, VideoType::FinalVideo, &[1])
        .await
        .unwrap();

    store.supersede_narration(chapter.id, 1).await.unwrap();

    for video_type in [VideoType::NarrationVideo, VideoType::FinalVideo] {
        let active = store.list_active_videos(chapter.id, video_type).await.unwrap();
        assert!(active.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_image_versions_increase_per_key(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;
    let chapter = store.create_chapters(novel_id, 1, &drafts(1)).await.unwrap()[0].clone();
    let narration = store.supersede_narration(chapter.id, 1).await.unwrap();
    let keys = [ShotKey::new(1, 1), ShotKey::new(1, 2), ShotKey::new(2, 1)];

    let v1 = store
        .allocate_image_versions(chapter.id, narration.id, &keys)
        .await
        .unwrap();
    let v2 = store
        .allocate_image_versions(chapter.id, narration.id, &keys)
        .await
        .unwrap();

    assert!(v1.iter().all(|i| i.version == 1));
    assert!(v2.iter().all(|i| i.version == 2));
    assert_eq!(store.list_images(chapter.id).await.unwrap().len(), 6);
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_guarded_audio_transitions(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;
    let chapter = store.create_chapters(novel_id, 1, &drafts(1)).await.unwrap()[0].clone();
    let narration = store.supersede_narration(chapter.id, 1).await.unwrap();

    let audio = store
        .create_pending_audio(narration.id, &[ShotKey::new(1, 1)])
        .await
        .unwrap()
        .remove(0);
    store.fail_audio(audio.id, "rate limited").await.unwrap();
    store.reset_audio(audio.id).await.unwrap();
    let done = store.complete_audio(audio.id, "a.mp3", 1500).await.unwrap();
    assert_eq!(done.state(), UnitState::Completed);

    assert_matches!(
        store.fail_audio(audio.id, "late").await,
        Err(StoreError::InvalidTransition { .. })
    );
    assert_matches!(
        store.create_pending_audio(narration.id, &[ShotKey::new(1, 1)]).await,
        Err(StoreError::Conflict(_))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_replace_videos_tombstones_previous(pool: PgPool) {
    let store = PgStore::new(pool);
    let novel_id = seed_novel(&store).await;
    let chapter = store.create_chapters(novel_id, 1, &drafts(1)).await.unwrap()[0].clone();

    let first = store
        .replace_videos(chapter.id, 1, VideoType::NarrationVideo, &[1, 2])
        .await
        .unwrap();
    store.start_video(first[0].id, "job-1").await.unwrap();

    store
        .replace_videos(chapter.id, 1, VideoType::NarrationVideo, &[1, 2, 3])
        .await
        .unwrap();
    let active = store
        .list_active_videos(chapter.id, VideoType::NarrationVideo)
        .await
        .unwrap();
    assert_eq!(active.len(), 3);
    assert!(store.find_video(first[0].id).await.unwrap().is_none());
}
