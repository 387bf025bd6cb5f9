//! Recording identity.
//!
//! Result tables written by different stages and different runs refer to the
//! same recording through whatever path was current at the time. The identity
//! is the bare file name, so `ASC/Fix Aligned/s01_fa.asc` and
//! `C:\data\s01_fa.asc` reconcile to the same key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Directory-independent key for a recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    /// Derives the identity of a path-like string.
    ///
    /// Both `/` and `\` count as separators regardless of platform, and a
    /// leading drive letter (`C:`) is dropped along with the directories.
    pub fn of(path: &str) -> Self {
        Self(identity(path).to_string())
    }

    /// Derives the identity of a filesystem path.
    pub fn of_path(path: &Path) -> Self {
        Self::of(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns the trailing file name of `path`.
///
/// Never fails: input without separators comes back unchanged.
pub fn identity(path: &str) -> &str {
    let trimmed = path.trim();
    let without_drive = strip_drive(trimmed);
    match without_drive.rfind(['/', '\\']) {
        Some(idx) => &without_drive[idx + 1..],
        None => without_drive,
    }
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        &path[2..]
    } else {
        path
    }
}
