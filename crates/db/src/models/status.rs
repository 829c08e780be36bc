//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` / `*_types` database table.

use storyreel_core::lifecycle::UnitState;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                $(
                    if id == $val {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Uploaded resource status.
    ResourceStatus {
        Pending = 1,
        Ready = 2,
        Failed = 3,
    }
}

define_status_enum! {
    /// Status of narrations, audio clips, subtitles and images.
    GenerationStatus {
        Pending = 1,
        Completed = 2,
        Failed = 3,
    }
}

define_status_enum! {
    /// Status of videos, which also pass through `processing` while the
    /// provider job runs.
    VideoStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Kind of assembled video.
    VideoType {
        NarrationVideo = 1,
        FinalVideo = 2,
    }
}

impl ResourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl VideoType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NarrationVideo => "narration_video",
            Self::FinalVideo => "final_video",
        }
    }
}

// ---------------------------------------------------------------------------
// Unit state mapping
// ---------------------------------------------------------------------------

/// A status lookup enum that maps onto the core [`UnitState`] machine.
pub trait UnitStatus: Copy + Sized {
    fn from_id(id: StatusId) -> Option<Self>;
    fn id(self) -> StatusId;
    fn from_state(state: UnitState) -> Option<Self>;
    fn state(self) -> UnitState;
}

impl UnitStatus for GenerationStatus {
    fn from_id(id: StatusId) -> Option<Self> {
        GenerationStatus::from_id(id)
    }

    fn id(self) -> StatusId {
        GenerationStatus::id(self)
    }

    fn from_state(state: UnitState) -> Option<Self> {
        match state {
            UnitState::Pending => Some(Self::Pending),
            UnitState::Completed => Some(Self::Completed),
            UnitState::Failed => Some(Self::Failed),
            UnitState::Processing => None,
        }
    }

    fn state(self) -> UnitState {
        match self {
            Self::Pending => UnitState::Pending,
            Self::Completed => UnitState::Completed,
            Self::Failed => UnitState::Failed,
        }
    }
}

impl UnitStatus for VideoStatus {
    fn from_id(id: StatusId) -> Option<Self> {
        VideoStatus::from_id(id)
    }

    fn id(self) -> StatusId {
        VideoStatus::id(self)
    }

    fn from_state(state: UnitState) -> Option<Self> {
        Some(match state {
            UnitState::Pending => Self::Pending,
            UnitState::Processing => Self::Processing,
            UnitState::Completed => Self::Completed,
            UnitState::Failed => Self::Failed,
        })
    }

    fn state(self) -> UnitState {
        match self {
            Self::Pending => UnitState::Pending,
            Self::Processing => UnitState::Processing,
            Self::Completed => UnitState::Completed,
            Self::Failed => UnitState::Failed,
        }
    }
}

/// Map a stored status ID to a unit state. Unknown IDs read as failed so
/// they never satisfy a stage dependency.
pub fn unit_state<S: UnitStatus>(id: StatusId) -> UnitState {
    S::from_id(id).map(S::state).unwrap_or(UnitState::Failed)
}

/// Status IDs from which a row may legally move to `next`.
pub fn source_ids<S: UnitStatus>(next: UnitState) -> Vec<StatusId> {
    UnitState::allowed_sources(next)
        .iter()
        .filter_map(|s| S::from_state(*s))
        .map(S::id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for status in [VideoStatus::Pending, VideoStatus::Processing, VideoStatus::Failed] {
            assert_eq!(VideoStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(GenerationStatus::from_id(9), None);
    }

    #[test]
    fn unknown_id_reads_as_failed() {
        assert_eq!(unit_state::<GenerationStatus>(2), UnitState::Completed);
        assert_eq!(unit_state::<GenerationStatus>(42), UnitState::Failed);
    }

    #[test]
    fn generation_sources_skip_processing() {
        // Completed may follow pending or processing; generation rows have
        // no processing status, so only pending remains.
        assert_eq!(
            source_ids::<GenerationStatus>(UnitState::Completed),
            vec![GenerationStatus::Pending.id()]
        );
        assert_eq!(
            source_ids::<VideoStatus>(UnitState::Completed),
            vec![VideoStatus::Pending.id(), VideoStatus::Processing.id()]
        );
        assert_eq!(
            source_ids::<GenerationStatus>(UnitState::Pending),
            vec![GenerationStatus::Failed.id()]
        );
    }
}
