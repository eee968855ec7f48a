//! Dotted field paths and JSON value access
//!
//! A path is a sequence of segments. A segment is a field name, a numeric
//! array index, `*` (any element of an array) or `$parent` (one level up,
//! used only by reference queries).

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Segment matching any array element
pub const ANY: &str = "*";

/// Segment moving one level up from a reference field
pub const PARENT: &str = "$parent";

/// A dotted field path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The empty path, addressing the document itself
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a dotted path. The empty string is the empty path.
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::empty();
        }
        Self {
            segments: s.split('.').map(str::to_string).collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The first `n` segments
    pub fn head(&self, n: usize) -> Path {
        Path {
            segments: self.segments.iter().take(n).cloned().collect(),
        }
    }

    /// Everything after the first `n` segments
    pub fn tail(&self, n: usize) -> Path {
        Path {
            segments: self.segments.iter().skip(n).cloned().collect(),
        }
    }

    /// The path without its last segment
    pub fn parent(&self) -> Path {
        self.head(self.len().saturating_sub(1))
    }

    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    pub fn push(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Path { segments }
    }

    /// True if any segment is `*`
    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s == ANY)
    }

    /// True if the first segment is `$parent`
    pub fn is_parent_relative(&self) -> bool {
        self.segments.first().map(|s| s == PARENT).unwrap_or(false)
    }

    /// Segment-wise exact prefix test
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.len() <= self.len() && self.segments[..prefix.len()] == prefix.segments[..]
    }

    /// Prefix test where a `*` segment on either side matches any segment
    /// on the other side.
    pub fn matches_prefix(&self, pattern: &Path) -> bool {
        pattern.len() <= self.len()
            && self
                .segments
                .iter()
                .zip(pattern.segments.iter())
                .all(|(s, p)| segment_matches(s, p))
    }

    /// Full-length version of [`Path::matches_prefix`]
    pub fn matches(&self, pattern: &Path) -> bool {
        self.len() == pattern.len() && self.matches_prefix(pattern)
    }

    /// Replaces the first `prefix.len()` segments with `prefix`.
    ///
    /// Used to pin wildcard segments to a concrete array position.
    pub fn with_prefix(&self, prefix: &Path) -> Path {
        prefix.join(&self.tail(prefix.len()))
    }
}

/// True if the segment is a numeric array index
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn segment_matches(segment: &str, pattern: &str) -> bool {
    segment == pattern || segment == ANY || pattern == ANY
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PathVisitor;

        impl<'de> Visitor<'de> for PathVisitor {
            type Value = Path;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a dotted field path")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Path, E> {
                Ok(Path::parse(v))
            }
        }

        deserializer.deserialize_str(PathVisitor)
    }
}

/// Every value reachable at `path`, each with its concrete path.
///
/// `*` expands every element of an array; a numeric segment indexes an
/// array. Missing fields yield nothing.
pub fn values_at<'a>(doc: &'a Value, path: &Path) -> Vec<(Path, &'a Value)> {
    let mut out = Vec::new();
    walk(doc, path.segments(), Vec::new(), &mut out);
    out
}

fn walk<'a>(value: &'a Value, rest: &[String], concrete: Vec<String>, out: &mut Vec<(Path, &'a Value)>) {
    let Some((segment, rest)) = rest.split_first() else {
        out.push((Path { segments: concrete }, value));
        return;
    };

    match value {
        Value::Array(items) if segment == ANY => {
            for (i, item) in items.iter().enumerate() {
                let mut next = concrete.clone();
                next.push(i.to_string());
                walk(item, rest, next, out);
            }
        }
        Value::Array(items) if is_index(segment) => {
            if let Some(item) = segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                let mut next = concrete;
                next.push(segment.clone());
                walk(item, rest, next, out);
            }
        }
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                let mut next = concrete;
                next.push(segment.clone());
                walk(child, rest, next, out);
            }
        }
        _ => {}
    }
}

/// Leaf values at `path` with arrays at the leaf flattened into their
/// elements. An absent field yields a single `null`.
pub fn leaf_values(doc: &Value, path: &Path) -> Vec<Value> {
    let found = values_at(doc, path);
    if found.is_empty() {
        return vec![Value::Null];
    }
    let mut out = Vec::new();
    for (_, value) in found {
        match value {
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Mutable access to the value at a concrete path (no wildcards)
pub fn get_mut_at<'a>(doc: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets the field at a concrete path. The containing object must exist.
///
/// Returns false when the container is missing or is not an object.
pub fn set_at(doc: &mut Value, path: &Path, value: Value) -> bool {
    let Some(field) = path.last() else {
        return false;
    };
    match get_mut_at(doc, &path.parent()) {
        Some(Value::Object(map)) => {
            map.insert(field.to_string(), value);
            true
        }
        _ => false,
    }
}
