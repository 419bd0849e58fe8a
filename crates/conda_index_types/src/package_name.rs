use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A conda package name.
///
/// Stores both the source string (as it appeared in `index.json`) and a
/// normalized form used for comparisons and map keys. Conda package names are
/// always lowercase ASCII with `-`/`_`/`.` as the only allowed separators;
/// normalization lowercases and collapses `_`/`.` into `-`.
#[derive(Debug, Clone, Eq)]
pub struct PackageName {
    normalized: String,
    source: String,
}

impl PackageName {
    /// Construct from a source string, normalizing it.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let normalized = normalize(&source);
        Self { normalized, source }
    }

    /// Construct from a string that is already known to be normalized.
    pub fn new_unchecked(normalized: impl Into<String>) -> Self {
        let normalized = normalized.into();
        Self {
            source: normalized.clone(),
            normalized,
        }
    }

    /// The string as it originally appeared.
    pub fn as_source(&self) -> &str {
        &self.source
    }

    /// The normalized comparison form.
    pub fn as_normalized(&self) -> &str {
        &self.normalized
    }
}

fn normalize(source: &str) -> String {
    source
        .chars()
        .map(|c| match c {
            '_' | '.' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for PackageName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Ok(PackageName::new(source))
    }
}
