//! Home Assistant version ordering
//!
//! Versions are calendar based (`2026.1.1`) with optional pre-release
//! modifiers: `2026.1.0.dev0 < 2026.1.0a1 < 2026.1.0b1 < 2026.1.0rc1 < 2026.1.0`.

use crate::error::RestoreError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Pre-release modifier, ordered from least to most mature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Modifier {
    Dev(u64),
    Alpha(u64),
    Beta(u64),
    Rc(u64),
    Release,
}

impl Modifier {
    fn parse(s: &str) -> Option<Self> {
        let (tag, number) = split_digits_suffix(s);
        let number = if number.is_empty() {
            0
        } else {
            number.parse().ok()?
        };
        match tag {
            "dev" => Some(Self::Dev(number)),
            "a" | "alpha" => Some(Self::Alpha(number)),
            "b" | "beta" => Some(Self::Beta(number)),
            "rc" => Some(Self::Rc(number)),
            _ => None,
        }
    }
}

/// A parsed Home Assistant version
#[derive(Debug, Clone)]
pub struct HaVersion {
    raw: String,
    segments: Vec<u64>,
    modifier: Modifier,
}

impl HaVersion {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self, RestoreError> {
        let invalid = || RestoreError::InvalidVersion {
            version: version.to_string(),
        };

        let mut segments = Vec::new();
        let mut modifier = Modifier::Release;

        for (index, part) in version.trim().split('.').enumerate() {
            if modifier != Modifier::Release {
                // Nothing may follow a modifier
                return Err(invalid());
            }

            let digits_end = part
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(part.len());
            let (digits, suffix) = part.split_at(digits_end);

            if digits.is_empty() {
                // `.dev0` style modifier as its own part
                if index == 0 {
                    return Err(invalid());
                }
                modifier = Modifier::parse(suffix).ok_or_else(invalid)?;
                continue;
            }

            segments.push(digits.parse().map_err(|_| invalid())?);
            if !suffix.is_empty() {
                modifier = Modifier::parse(suffix).ok_or_else(invalid)?;
            }
        }

        if segments.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            raw: version.trim().to_string(),
            segments,
            modifier,
        })
    }

    fn segment(&self, index: usize) -> u64 {
        self.segments.get(index).copied().unwrap_or(0)
    }
}

/// Refuse backups made by a newer Home Assistant than the one running
pub fn check_backup_version(backup_version: &str, running_version: &str) -> Result<(), RestoreError> {
    let required = HaVersion::parse(backup_version)?;
    let running = HaVersion::parse(running_version)?;

    if required > running {
        return Err(RestoreError::UnsupportedVersion {
            required: required.to_string(),
        });
    }
    Ok(())
}

/// Split `rc12` into `("rc", "12")`
fn split_digits_suffix(s: &str) -> (&str, &str) {
    let split = s
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(split)
}

impl FromStr for HaVersion {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for HaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.modifier.cmp(&other.modifier))
    }
}

impl PartialOrd for HaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HaVersion {}
