//! Validation, splitting and string operations on Work Paths.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, PathResult};

/// The canonical Work Path separator.
pub const SEPARATOR: char = '/';

const INVALID_PATH_CHARS: [char; 42] = [
    '"', '\\', '<', '>', '|', '?', '*', ':', '^', '%', '\u{0}', '\u{1}', '\u{2}', '\u{3}',
    '\u{4}', '\u{5}', '\u{6}', '\u{7}', '\u{8}', '\u{9}', '\u{a}', '\u{b}', '\u{c}', '\u{d}',
    '\u{e}', '\u{f}', '\u{10}', '\u{11}', '\u{12}', '\u{13}', '\u{14}', '\u{15}', '\u{16}',
    '\u{17}', '\u{18}', '\u{19}', '\u{1a}', '\u{1b}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{1f}',
];

fn is_reserved(c: char) -> bool {
    (c as u32) < 0x20 || matches!(c, '"' | '\\' | '<' | '>' | '|' | '?' | '*' | ':' | '^' | '%')
}

/// The reserved characters, in a fixed order.
pub fn invalid_path_chars() -> &'static [char] {
    &INVALID_PATH_CHARS
}

/// Returns `true` if `path` contains any reserved character. A `false` result
/// does not make the path valid.
pub fn has_invalid_chars(path: &str) -> bool {
    path.chars().any(is_reserved)
}

/// Returns `true` if `path` is a valid Work Path.
pub fn is_path_valid(path: &str) -> bool {
    split_vector(path).all(|segment| segment.is_ok())
}

/// Split a Work Path into its segments lazily.
///
/// Each item is a validated segment. The first problem found is yielded as an
/// error and ends the iteration; segments before it have already been
/// yielded.
pub fn split_vector(path: &str) -> SegmentIter<'_> {
    SegmentIter {
        path,
        pos: 0,
        state: IterState::Start,
    }
}

/// Split a Work Path into all of its segments, or fail on the first problem.
pub fn path_vector(path: &str) -> PathResult<Vec<&str>> {
    split_vector(path).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IterState {
    Start,
    Running,
    Done,
}

/// Iterator returned by [`split_vector`].
#[derive(Clone, Debug)]
pub struct SegmentIter<'a> {
    path: &'a str,
    pos: usize,
    state: IterState,
}

impl<'a> SegmentIter<'a> {
    fn fail(&mut self, err: PathError) -> Option<PathResult<&'a str>> {
        self.state = IterState::Done;
        Some(Err(err))
    }
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = PathResult<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            IterState::Done => return None,
            IterState::Start => {
                self.state = IterState::Running;
                if self.path.trim().is_empty() {
                    return self.fail(PathError::NotAPath);
                }
                if self.path.starts_with(SEPARATOR) {
                    return self.fail(PathError::StartsWithSeparator);
                }
            }
            IterState::Running => {}
        }

        if self.pos > self.path.len() {
            self.state = IterState::Done;
            return None;
        }

        let start = self.pos;
        let mut end = self.path.len();
        for (i, c) in self.path[start..].char_indices() {
            if is_reserved(c) {
                return self.fail(PathError::InvalidCharacter {
                    character: c,
                    position: start + i,
                });
            }
            if c == SEPARATOR {
                end = start + i;
                break;
            }
        }
        self.pos = end + 1;

        let segment = &self.path[start..end];
        if segment.is_empty() {
            return self.fail(PathError::EmptySegment { position: start });
        }
        if segment.starts_with(' ') || segment.ends_with(' ') {
            return self.fail(PathError::PaddedSegment {
                segment: segment.to_string(),
            });
        }
        Some(Ok(segment))
    }
}

impl std::iter::FusedIterator for SegmentIter<'_> {}

/// Join raw path strings left to right. Performs no validation.
///
/// Between two parts one separator is inserted when neither touches it, two
/// touching separators collapse into one, and anything else is joined
/// verbatim. Empty parts are skipped.
///
/// ```
/// use flawless_path::combine;
///
/// assert_eq!(combine(["abc", "def"]), "abc/def");
/// assert_eq!(combine(["abc/", "/def"]), "abc/def");
/// assert_eq!(combine(["abc", "/"]), "abc/");
/// ```
pub fn combine<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(part);
            continue;
        }
        let end_sep = out.ends_with(SEPARATOR);
        let start_sep = part.starts_with(SEPARATOR);
        match (end_sep, start_sep) {
            (false, false) => {
                out.push(SEPARATOR);
                out.push_str(part);
            }
            (true, true) => out.push_str(&part[SEPARATOR.len_utf8()..]),
            _ => out.push_str(part),
        }
    }
    out
}

/// The part of `path` below `base`.
///
/// Returns `Ok(None)` when `path` is not under `base` or either input is
/// empty, and `Ok(Some(""))` when both name the same location. Malformed
/// segments reached during the walk are errors.
pub fn relative_path(base: &str, path: &str) -> PathResult<Option<String>> {
    if base.is_empty() || path.is_empty() {
        return Ok(None);
    }

    let mut parent = split_vector(base);
    let mut child = split_vector(path);
    loop {
        let p = parent.next().transpose()?;
        let c = child.next().transpose()?;
        match (p, c) {
            (Some(p), Some(c)) if p == c => continue,
            (None, Some(first)) => {
                let mut out = String::from(first);
                for segment in child {
                    out.push(SEPARATOR);
                    out.push_str(segment?);
                }
                return Ok(Some(out));
            }
            (None, None) => return Ok(Some(String::new())),
            _ => return Ok(None),
        }
    }
}

fn last_segment_start(path: &str) -> usize {
    path.rfind(SEPARATOR).map_or(0, |i| i + 1)
}

/// The final segment of `path`. Empty when the path ends with a separator.
pub fn name(path: &str) -> &str {
    &path[last_segment_start(path)..]
}

/// The final segment without its extension. `.git` has no name part.
pub fn name_without_extension(path: &str) -> &str {
    let name = name(path);
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// Returns `true` if the final segment contains a `.`.
pub fn has_extension(path: &str) -> bool {
    name(path).contains('.')
}

/// Text after the last `.` of the final segment, without the dot.
pub fn extension(path: &str) -> &str {
    let name = name(path);
    match name.rfind('.') {
        Some(dot) => &name[dot + 1..],
        None => "",
    }
}

/// Replace the extension of the final segment, or strip it with `None`.
pub fn change_extension(path: &str, extension: Option<&str>) -> String {
    let start = last_segment_start(path);
    match (path[start..].rfind('.'), extension) {
        (Some(dot), Some(ext)) => format!("{}{}", &path[..=start + dot], ext),
        (Some(dot), None) => path[..start + dot].to_string(),
        (None, Some(ext)) => format!("{path}.{ext}"),
        (None, None) => path.to_string(),
    }
}

/// Returns `true` if `path` ends with the separator.
pub fn ends_in_separator(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Returns `true` if `path` contains the separator at all.
pub fn is_nested(path: &str) -> bool {
    path.contains(SEPARATOR)
}

/// A validated Work Path.
///
/// Ordered and compared bytewise, so it can key a sorted file map directly.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkPath(String);

impl WorkPath {
    /// Validate and wrap `path`.
    pub fn new(path: impl Into<String>) -> PathResult<Self> {
        let path = path.into();
        for segment in split_vector(&path) {
            segment?;
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The validated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    pub fn name(&self) -> &str {
        name(&self.0)
    }

    pub fn extension(&self) -> &str {
        extension(&self.0)
    }

    /// The containing directory, if the path is nested.
    pub fn parent(&self) -> Option<WorkPath> {
        self.0
            .rfind(SEPARATOR)
            .map(|i| WorkPath(self.0[..i].to_string()))
    }

    /// Append `child` below this path and validate the result.
    pub fn join(&self, child: &str) -> PathResult<WorkPath> {
        WorkPath::new(combine([self.as_str(), child]))
    }

    /// Returns `true` if `self` is `base` or lies below it.
    pub fn starts_with(&self, base: &WorkPath) -> bool {
        self.0 == base.0
            || (self.0.starts_with(&base.0) && self.0[base.0.len()..].starts_with(SEPARATOR))
    }
}

impl fmt::Debug for WorkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkPath({:?})", self.0)
    }
}

impl fmt::Display for WorkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for WorkPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for WorkPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for WorkPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkPath> for String {
    fn from(value: WorkPath) -> Self {
        value.0
    }
}
