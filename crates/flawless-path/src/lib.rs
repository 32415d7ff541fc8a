//! The Work Path dialect.
//!
//! A Work Path names a file inside a depot. It is relative, uses `/` as its
//! only separator, and is validated the same way on every platform:
//!
//! ```text
//! root/subfolder/file.txt
//! ```
//!
//! - never empty or blank, never starts with `/`
//! - every segment is non-empty and has no leading or trailing space
//! - no reserved character (`" \ < > | ? * : ^ %` and control bytes 0-31)
//!
//! Only [`to_host_path`] and [`from_host_path`] deal with host path syntax.
//! Everything else in Flawless works on Work Paths.

pub mod error;
pub mod host;
pub mod work_path;

pub use error::{PathError, PathResult};
pub use host::{from_host_path, to_host_path};
pub use work_path::{
    change_extension, combine, ends_in_separator, extension, has_extension, has_invalid_chars,
    invalid_path_chars, is_nested, is_path_valid, name, name_without_extension, path_vector,
    relative_path, split_vector, SegmentIter, WorkPath, SEPARATOR,
};
