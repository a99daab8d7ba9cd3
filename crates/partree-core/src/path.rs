//! Dot-separated path model
//!
//! Paths address nodes in the tree: `a.b.c` names the node `c` under `a.b`.
//! Segments are `[A-Za-z0-9_-]+`, compared case-insensitively; the stored
//! form is trimmed, trailing-separator-stripped, and lower-cased.
//!
//! [`NodePath::parse`] is the single validation gate: every other component
//! routes untrusted input through it before use, so a `NodePath` value is
//! always normalized.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// A validated, normalized node path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

impl NodePath {
    /// Normalize and validate a raw path.
    ///
    /// Trims surrounding whitespace, strips one trailing separator,
    /// lower-cases, then validates the segment grammar. Idempotent:
    /// parsing an already-normalized path returns the same value.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_suffix(SEPARATOR).unwrap_or(trimmed);
        if !Self::is_valid(stripped) {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(stripped.to_ascii_lowercase()))
    }

    /// True iff `raw` is non-empty and every segment matches `[A-Za-z0-9_-]+`
    pub fn is_valid(raw: &str) -> bool {
        !raw.is_empty()
            && raw.split(SEPARATOR).all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
    }

    /// Build a path from individual segments
    pub fn join<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string());
        Self::parse(&joined)
    }

    /// Construct from a string that is already normalized.
    ///
    /// Used internally when reassembling paths from stored segments, which
    /// went through [`NodePath::parse`] when they were written.
    pub(crate) fn from_normalized(path: String) -> Self {
        debug_assert!(Self::is_valid(&path));
        Self(path)
    }

    /// The normalized path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parent path, or `None` for top-level paths
    pub fn parent(&self) -> Option<NodePath> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| Self(self.0[..idx].to_string()))
    }

    /// The segment after the last separator, or the whole path if none
    pub fn leaf(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Iterate the path's segments in order
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Proper ancestors, outermost first: `a.b.c` -> `[a, a.b]`
    pub fn ancestors(&self) -> Vec<NodePath> {
        let mut ancestors = Vec::new();
        let mut current = String::new();
        let segments: Vec<&str> = self.segments().collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !current.is_empty() {
                current.push(SEPARATOR);
            }
            current.push_str(segment);
            ancestors.push(Self(current.clone()));
        }
        ancestors
    }

    /// Segment-aware prefix test: true when this path equals `prefix` or
    /// sits beneath it.
    ///
    /// `team.one` matches prefix `team`; `teamx` does not, even though it
    /// starts with the same characters.
    pub fn starts_with_segment(&self, prefix: &str) -> bool {
        self.0 == prefix
            || (self.0.len() > prefix.len()
                && self.0.starts_with(prefix)
                && self.0[prefix.len()..].starts_with(SEPARATOR))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodePath {
    type Error = StoreError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.0
    }
}
