//! Translation between Work Paths and host file-system paths.
//!
//! Host paths are handled lexically. Both `/` and `\` are accepted as host
//! separators so that paths recorded on one platform can be translated on
//! another.

use std::path::MAIN_SEPARATOR;

use crate::error::{PathError, PathResult};
use crate::work_path::SEPARATOR;

fn is_host_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Append `path` to `working_directory`, converting separators to the host
/// form. Performs no validation.
pub fn to_host_path(path: &str, working_directory: &str) -> String {
    let mut out = String::with_capacity(working_directory.len() + path.len() + 1);
    out.push_str(working_directory);
    if !out.ends_with(is_host_separator) {
        out.push(MAIN_SEPARATOR);
    }
    for c in path.chars() {
        out.push(if c == SEPARATOR { MAIN_SEPARATOR } else { c });
    }
    out
}

/// The Work Path naming `host_path` relative to `working_directory`.
///
/// Returns an empty string when both name the same directory. Fails with
/// [`PathError::OutsideWorkingDirectory`] when `host_path` is not below
/// `working_directory`, including siblings that share its root: a Work Path
/// has no `..` segment to climb out with.
pub fn from_host_path(host_path: &str, working_directory: &str) -> PathResult<String> {
    let outside = || PathError::OutsideWorkingDirectory {
        path: host_path.to_string(),
        working_directory: working_directory.to_string(),
    };

    let target = HostComponents::parse(host_path);
    let base = HostComponents::parse(working_directory);
    if target.anchor != base.anchor {
        return Err(outside());
    }
    if target.parts.len() < base.parts.len()
        || target.parts[..base.parts.len()] != base.parts[..]
    {
        return Err(outside());
    }

    Ok(target.parts[base.parts.len()..].join(&SEPARATOR.to_string()))
}

#[derive(Debug, PartialEq, Eq)]
enum Anchor {
    Relative,
    Root,
    Drive(char),
}

#[derive(Debug)]
struct HostComponents<'a> {
    anchor: Anchor,
    parts: Vec<&'a str>,
}

impl<'a> HostComponents<'a> {
    fn parse(path: &'a str) -> Self {
        let mut rest = path;
        let mut anchor = Anchor::Relative;

        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            anchor = Anchor::Drive(bytes[0].to_ascii_uppercase() as char);
            rest = &rest[2..];
        } else if rest.starts_with(is_host_separator) {
            anchor = Anchor::Root;
        }

        let mut parts: Vec<&str> = Vec::new();
        for part in rest.split(is_host_separator) {
            match part {
                "" | "." => {}
                ".." => {
                    if matches!(parts.last(), Some(last) if *last != "..") {
                        parts.pop();
                    } else if anchor == Anchor::Relative {
                        parts.push(part);
                    }
                }
                _ => parts.push(part),
            }
        }

        Self { anchor, parts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_to_work_path() {
        let cases = [
            ("/root/test/abc/def", "/root/test/", "abc/def"),
            ("/root/test/abc/def", "/root/test", "abc/def"),
            ("/root/test", "/root/test", ""),
            ("/root/test/", "/root/test", ""),
            ("/root/test", "/root/test/", ""),
            ("/root/test/", "/root/test/", ""),
            ("./root/test/abc/def", "./root/test", "abc/def"),
            (r".\root\test", r".\root\test", ""),
            (r".\root\test", r".\root/test", ""),
            (r".\root\test\abc\def", r".\root\test", "abc/def"),
            (r"C:\root\test\abc\def", r"C:\root\test\", "abc/def"),
            (r"C:\root\test\abc\def", r"C:\root\test", "abc/def"),
            (r"C:\root/test\abc/def", r"C:\root\test\", "abc/def"),
            (r"C:\root\test\abc\def", r"C:\root/test", "abc/def"),
            ("/root/test/./abc/../abc/def", "/root/test", "abc/def"),
        ];
        for (host, wd, expected) in cases {
            assert_eq!(from_host_path(host, wd).unwrap(), expected, "{host:?} under {wd:?}");
        }
    }

    #[test]
    fn host_path_outside_working_directory() {
        for (host, wd) in [
            ("/other/abc", "/root/test"),
            ("/root", "/root/test"),
            ("relative/abc", "/root/test"),
            (r"D:\root\test\abc", r"C:\root\test"),
            ("/root/testing/abc", "/root/test"),
        ] {
            assert!(
                matches!(
                    from_host_path(host, wd),
                    Err(PathError::OutsideWorkingDirectory { .. })
                ),
                "{host:?} under {wd:?}"
            );
        }
    }

    #[test]
    fn sibling_of_working_directory_is_outside() {
        for (host, wd) in [
            ("/root/other/x", "/root/test"),
            ("/root/test/../other/x", "/root/test"),
            (r"C:\root\other\x", r"C:\root\test"),
        ] {
            let err = from_host_path(host, wd).unwrap_err();
            assert!(
                matches!(err, PathError::OutsideWorkingDirectory { .. }),
                "{host:?} under {wd:?}: {err:?}"
            );
        }
    }

    #[test]
    fn work_to_host_path() {
        let sep = MAIN_SEPARATOR;
        assert_eq!(
            to_host_path("abc/def", "/root/test"),
            format!("/root/test{sep}abc{sep}def")
        );
        assert_eq!(
            to_host_path("abc/def", "/root/test/"),
            format!("/root/test/abc{sep}def")
        );
        assert_eq!(to_host_path("", "/root"), format!("/root{sep}"));
    }

    #[test]
    fn host_round_trip() {
        let host = to_host_path("src/lib.rs", "/work/repo");
        assert_eq!(from_host_path(&host, "/work/repo").unwrap(), "src/lib.rs");
    }
}
