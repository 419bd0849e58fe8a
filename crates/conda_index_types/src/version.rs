use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A conda version, ordered per conda's dot/underscore-segment algorithm.
///
/// Stores the original source string (used for `Display`/serialization) plus
/// a parsed decomposition (epoch, dot/underscore-delimited segments, and an
/// optional "local" version after a `+`) used for ordering.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    source: String,
    epoch: u64,
    segments: Vec<Segment>,
    local: Vec<Segment>,
}

type Segment = Vec<Component>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Number(u64),
    Ident(String),
}

impl Component {
    /// `dev` sorts below every other identifier; `post` sorts above every
    /// other identifier and above any numeral; everything else sorts between
    /// them, with numerals above plain identifiers.
    fn tier(&self) -> i8 {
        match self {
            Component::Ident(s) if s.eq_ignore_ascii_case("dev") => -1,
            Component::Ident(s) if s.eq_ignore_ascii_case("post") => 1,
            _ => 0,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Component {}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ta, tb) = (self.tier(), other.tier());
        if ta != tb {
            return ta.cmp(&tb);
        }
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            (Component::Number(_), Component::Ident(_)) => Ordering::Greater,
            (Component::Ident(_), Component::Number(_)) => Ordering::Less,
            (Component::Ident(a), Component::Ident(b)) => {
                a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
            }
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid epoch in version {0:?}")]
    InvalidEpoch(String),
}

impl Version {
    pub fn parse(source: &str) -> Result<Self, VersionParseError> {
        if source.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (epoch_str, rest) = match source.split_once('!') {
            Some((epoch, rest)) => (Some(epoch), rest),
            None => (None, source),
        };
        let epoch = match epoch_str {
            Some(e) => e
                .parse::<u64>()
                .map_err(|_| VersionParseError::InvalidEpoch(source.to_string()))?,
            None => 0,
        };

        let (main, local) = match rest.split_once('+') {
            Some((main, local)) => (main, local),
            None => (rest, ""),
        };

        Ok(Version {
            source: source.to_string(),
            epoch,
            segments: split_segments(main),
            local: split_segments(local),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn split_segments(s: &str) -> Vec<Segment> {
    s.split(['.', '_']).map(split_components).collect()
}

fn split_components(segment: &str) -> Segment {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut current_is_digit: Option<bool> = None;

    for c in segment.chars() {
        let is_digit = c.is_ascii_digit();
        if current_is_digit == Some(is_digit) || current.is_empty() {
            current.push(c);
            current_is_digit = Some(is_digit);
        } else {
            components.push(finish_component(&current, current_is_digit == Some(true)));
            current.clear();
            current.push(c);
            current_is_digit = Some(is_digit);
        }
    }
    if !current.is_empty() {
        components.push(finish_component(&current, current_is_digit == Some(true)));
    }
    components
}

fn finish_component(s: &str, is_digit: bool) -> Component {
    if is_digit {
        Component::Number(s.parse().unwrap_or(0))
    } else {
        Component::Ident(s.to_string())
    }
}

fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    let len = a.len().max(b.len());
    let empty: Segment = Vec::new();
    for i in 0..len {
        let sa = a.get(i).unwrap_or(&empty);
        let sb = b.get(i).unwrap_or(&empty);
        let ord = compare_components(sa, sb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_components(a: &[Component], b: &[Component]) -> Ordering {
    let len = a.len().max(b.len());
    let zero = Component::Number(0);
    for i in 0..len {
        let ca = a.get(i).unwrap_or(&zero);
        let cb = b.get(i).unwrap_or(&zero);
        let ord = ca.cmp(cb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.segments, &other.segments))
            .then_with(|| compare_segments(&self.local, &other.local))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Version::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn simple_numeric_ordering() {
        assert!(v("1.2") < v("1.10"));
        assert!(v("1.0") < v("2.0"));
    }

    #[test]
    fn epoch_dominates() {
        assert!(v("1!0.1") > v("9.9"));
    }

    #[test]
    fn dev_sorts_below_release() {
        assert!(v("1.0.dev0") < v("1.0"));
    }

    #[test]
    fn post_sorts_above_release() {
        assert!(v("1.0.post0") > v("1.0"));
        assert!(v("1.0.dev0") < v("1.0") && v("1.0") < v("1.0.post0"));
    }

    #[test]
    fn local_version_breaks_ties() {
        assert!(v("1.0") < v("1.0+1"));
        assert!(v("1.0+1") < v("1.0+2"));
    }

    #[test]
    fn underscore_and_dot_are_equivalent_delimiters() {
        assert_eq!(v("1_0").cmp(&v("1.0")), Ordering::Equal);
    }

    #[test]
    fn missing_trailing_segment_treated_as_zero() {
        assert!(v("1.0") < v("1.0.1"));
        assert_eq!(v("1.0.0").cmp(&v("1.0")), Ordering::Equal);
    }
}
