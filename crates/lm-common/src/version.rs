//! Dotted numeric versions.
//!
//! A [`Version`] is a tuple of non-negative integers. Ordering is
//! element-wise and numeric, so `1.10.0 > 1.9.0`. Tuples of different
//! lengths compare as if the shorter one were padded with zeros, which makes
//! `1.2` and `1.2.0` equal. Strings with a non-numeric segment do not parse;
//! callers decide what an unparseable version means for them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid segment '{segment}' in version '{input}'")]
    InvalidSegment { input: String, segment: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    segments: Vec<u64>,
    raw: String,
}

impl Version {
    /// Parse a strictly numeric dotted version (`"8.1.20"`).
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }
        let segments = raw
            .split('.')
            .map(|seg| {
                if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionError::InvalidSegment {
                        input: raw.to_string(),
                        segment: seg.to_string(),
                    });
                }
                seg.parse::<u64>().map_err(|_| VersionError::InvalidSegment {
                    input: raw.to_string(),
                    segment: seg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version {
            segments,
            raw: raw.to_string(),
        })
    }

    /// Parse the leading numeric portion of a version-like string.
    ///
    /// Used for tracker output such as `8.1.20000.20231020_1146`, which yields
    /// `8.1.20000.20231020`. Parsing stops at the first segment that does not
    /// begin with a digit.
    pub fn parse_lenient(input: &str) -> Option<Self> {
        let raw = input.trim();
        let mut segments = Vec::new();
        for seg in raw.split('.') {
            let digits: String = seg.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            segments.push(digits.parse::<u64>().ok()?);
            if digits.len() != seg.len() {
                break;
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Version {
            segments,
            raw: raw.to_string(),
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// The original string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when every segment of `wanted` matches the corresponding segment
    /// of `self`; extra trailing segments on `self` are ignored.
    ///
    /// `8.1.20.0` satisfies `8.1.20`, `8.1.200` does not.
    pub fn satisfies(&self, wanted: &Version) -> bool {
        wanted
            .segments
            .iter()
            .enumerate()
            .all(|(i, w)| self.segments.get(i).copied().unwrap_or(0) == *w)
    }

    /// Whether `candidate` should replace `current`.
    ///
    /// Anything is newer than nothing.
    pub fn is_newer(current: Option<&Version>, candidate: &Version) -> bool {
        match current {
            None => true,
            Some(cur) => candidate > cur,
        }
    }

    fn trimmed(&self) -> &[u64] {
        let end = self
            .segments
            .iter()
            .rposition(|&s| s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..end]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trimmed().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_not_lexical() {
        assert!(v("2.1.0") > v("2.0.9"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("8.1.100") > v("8.1.99"));
    }

    #[test]
    fn test_ragged_pads_with_zero() {
        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("1.2").cmp(&v("1.2.0.0")), Ordering::Equal);
        assert!(v("1.2.0.1") > v("1.2"));
        assert!(v("1.3") > v("1.2.9.9"));
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(Version::parse("1.2.beta").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("v1.2").is_err());
        assert!(Version::parse("1.2-3").is_err());
    }

    #[test]
    fn test_lenient_parses_tracker_strings() {
        let lv = Version::parse_lenient("8.1.20000.20231020_1146").unwrap();
        assert_eq!(lv.segments(), &[8, 1, 20000, 20231020]);
        assert_eq!(lv.as_str(), "8.1.20000.20231020_1146");

        let lv = Version::parse_lenient("8.1.20.0").unwrap();
        assert_eq!(lv.segments(), &[8, 1, 20, 0]);

        assert!(Version::parse_lenient("abc").is_none());
        assert!(Version::parse_lenient("").is_none());
    }

    #[test]
    fn test_satisfies_prefix() {
        assert!(v("8.1.20.0").satisfies(&v("8.1.20")));
        assert!(v("8.1.20").satisfies(&v("8.1.20.0")));
        assert!(!v("8.1.200").satisfies(&v("8.1.20")));
        assert!(!v("8.1").satisfies(&v("8.1.20")));
    }

    #[test]
    fn test_is_newer() {
        assert!(Version::is_newer(None, &v("1.0")));
        assert!(Version::is_newer(Some(&v("1.0")), &v("1.0.1")));
        assert!(!Version::is_newer(Some(&v("1.0.1")), &v("1.0.1")));
        assert!(!Version::is_newer(Some(&v("2.0")), &v("1.9")));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("1.2"));
        assert!(set.contains(&v("1.2.0")));
    }
}
