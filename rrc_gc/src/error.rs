use core::fmt;

use crate::object::ObjectId;

/// Result type for tracked-set management
pub type TrackResult<T> = Result<T, TrackError>;

/// Misuse of the tracked-set interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    /// The object is already a member of a tracked set
    AlreadyTracked(ObjectId),
    /// The object is not tracked
    NotTracked(ObjectId),
    /// The object is tracked, but not waiting for finalizers
    NotIsolated(ObjectId),
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::AlreadyTracked(obj) => write!(f, "object {obj} is already tracked"),
            TrackError::NotTracked(obj) => write!(f, "object {obj} is not tracked"),
            TrackError::NotIsolated(obj) => write!(f, "object {obj} is not isolated"),
        }
    }
}

impl core::error::Error for TrackError {}
