//! Error types for Work Path operations.

use thiserror::Error;

/// Why a string is not a Work Path, or why a host path cannot become one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Empty or all-whitespace input.
    #[error("not a valid work path: input is empty or blank")]
    NotAPath,

    /// The path begins with `/`.
    #[error("work path cannot start with a separator")]
    StartsWithSeparator,

    /// A reserved character appears in the path.
    #[error("invalid work path character {character:?} at byte {position}")]
    InvalidCharacter { character: char, position: usize },

    /// Two separators are adjacent, or the path ends with one.
    #[error("work path contains an empty segment at byte {position}")]
    EmptySegment { position: usize },

    /// A segment starts or ends with a space.
    #[error("work path segment {segment:?} starts or ends with a space")]
    PaddedSegment { segment: String },

    /// The host path is not located under the working directory.
    #[error("host path {path:?} is outside working directory {working_directory:?}")]
    OutsideWorkingDirectory {
        path: String,
        working_directory: String,
    },
}

/// Convenience type alias for Work Path operations.
pub type PathResult<T> = std::result::Result<T, PathError>;
