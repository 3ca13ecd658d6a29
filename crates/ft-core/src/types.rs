//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The alignment score was out of range.
    #[error("alignment score must be between 1 and 10, got {value}")]
    ScoreOutOfRange { value: i64 },

    /// Invalid task status value.
    #[error("invalid task status: {value}")]
    InvalidTaskStatus { value: String },
}

/// Lifecycle status of a user task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    Todo,
    /// The single task currently being tracked.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ValidationError::InvalidTaskStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated task identifier.
    ///
    /// Task IDs are UUID strings in practice, but any non-empty string is accepted.
    TaskId, "task ID"
);

define_string_id!(
    /// Digest of an observed window (process name + normalized title).
    ContextHash, "context hash"
);

define_string_id!(
    /// Digest of what the user is trying to do (task description + context hint).
    TaskContentHash, "task content hash"
);

impl ContextHash {
    /// Wraps a hex digest produced by [`crate::window`].
    pub(crate) const fn from_digest(hex: String) -> Self {
        Self(hex)
    }
}

impl TaskContentHash {
    /// Wraps a hex digest produced by [`crate::window`].
    pub(crate) const fn from_digest(hex: String) -> Self {
        Self(hex)
    }
}

/// How well an observed window matches the active task, on a 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlignmentScore(u8);

impl AlignmentScore {
    /// Lowest possible score (clearly off-task).
    pub const MIN: Self = Self(1);

    /// Highest possible score (directly on-task).
    pub const MAX: Self = Self(10);

    /// Creates a score after validation.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if !(1..=10).contains(&value) {
            return Err(ValidationError::ScoreOutOfRange { value });
        }
        Ok(Self::clamped(value))
    }

    /// Creates a score, clamping to \[1, 10\].
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        let clamped = value.clamp(1, 10);
        // clamp guarantees the value fits
        Self(u8::try_from(clamped).unwrap_or(1))
    }

    /// Returns the inner value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for AlignmentScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for AlignmentScore {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlignmentScore> for i64 {
    fn from(score: AlignmentScore) -> Self {
        Self::from(score.0)
    }
}

impl Serialize for AlignmentScore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AlignmentScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        // Classifier output is frequently out of range; be lenient.
        Ok(Self::clamped(value))
    }
}
