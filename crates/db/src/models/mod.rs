//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts where the row is created
//!   from caller input

pub mod audio;
pub mod chapter;
pub mod image;
pub mod narration;
pub mod novel;
pub mod resource;
pub mod status;
pub mod subtitle;
pub mod video;
