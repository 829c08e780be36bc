//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Methods that take part in
//! a multi-statement operation accept `&mut PgConnection` instead so the
//! caller can run them inside one transaction.

pub mod audio_repo;
pub mod chapter_repo;
pub mod image_repo;
pub mod narration_repo;
pub mod novel_repo;
pub mod resource_repo;
pub mod subtitle_repo;
pub mod video_repo;

pub use audio_repo::AudioRepo;
pub use chapter_repo::ChapterRepo;
pub use image_repo::ImageRepo;
pub use narration_repo::NarrationRepo;
pub use novel_repo::NovelRepo;
pub use resource_repo::ResourceRepo;
pub use subtitle_repo::SubtitleRepo;
pub use video_repo::VideoRepo;
