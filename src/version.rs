use crate::error::ReleaseError;
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `MAJOR.MINOR.MICRO[.devN]` release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub dev: Option<u64>,
}

impl Version {
    pub const fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            dev: None,
        }
    }

    pub const fn with_dev(self, dev: u64) -> Self {
        Self {
            dev: Some(dev),
            ..self
        }
    }

    pub fn parse(value: &str) -> Result<Self, ReleaseError> {
        value.parse()
    }

    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    /// The same version without a dev marker.
    pub fn release(&self) -> Self {
        Self::new(self.major, self.minor, self.micro)
    }
}

impl FromStr for Version {
    type Err = ReleaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ReleaseError::version_parse(value, "version is empty"));
        }

        let lowered = trimmed.to_ascii_lowercase();
        let (base, dev) = match lowered.find("dev") {
            Some(index) => {
                let number = &lowered[index + 3..];
                let dev = if number.is_empty() {
                    0
                } else {
                    number.parse::<u64>().map_err(|_| {
                        ReleaseError::version_parse(value, format!("invalid dev number `{number}`"))
                    })?
                };
                let base = lowered[..index].trim_end_matches(['.', '-', '_']);
                (base, Some(dev))
            }
            None => (lowered.as_str(), None),
        };

        let parts = base.split('.').collect::<Vec<_>>();
        if !(2..=3).contains(&parts.len()) {
            return Err(ReleaseError::version_parse(
                value,
                "expected MAJOR.MINOR[.MICRO]",
            ));
        }

        let mut numbers = [0_u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|ch| ch.is_ascii_digit()) {
                return Err(ReleaseError::version_parse(
                    value,
                    format!("`{part}` is not a number"),
                ));
            }
            *slot = part
                .parse()
                .map_err(|_| ReleaseError::version_parse(value, format!("`{part}` is too large")))?;
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            dev,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| match (self.dev, other.dev) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(left), Some(right)) => left.cmp(&right),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Two-digit year and 1-based month a calendar release belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarSlot {
    pub year: u64,
    pub month: u64,
}

impl CalendarSlot {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: (date.year().rem_euclid(100)) as u64,
            month: u64::from(date.month()),
        }
    }
}

impl fmt::Display for CalendarSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.year, self.month)
    }
}

pub fn calendar_version(current: &Version, slot: CalendarSlot) -> Result<Version, ReleaseError> {
    match (current.major, current.minor).cmp(&(slot.year, slot.month)) {
        Ordering::Less => Ok(Version::new(slot.year, slot.month, 0)),
        Ordering::Equal if current.is_dev() => Ok(Version::new(slot.year, slot.month, current.micro)),
        Ordering::Equal => Ok(Version::new(slot.year, slot.month, next_micro(current)?)),
        Ordering::Greater => Err(ReleaseError::CalendarVersionAhead {
            current: current.to_string(),
            slot: slot.to_string(),
        }),
    }
}

fn next_micro(current: &Version) -> Result<u64, ReleaseError> {
    current
        .micro
        .checked_add(1)
        .ok_or_else(|| ReleaseError::version_parse(current.to_string(), "micro version overflows"))
}

pub fn next_patch_version(current: &Version) -> Result<Version, ReleaseError> {
    if current.is_dev() {
        Ok(current.release())
    } else {
        Ok(Version::new(current.major, current.minor, next_micro(current)?))
    }
}

/// Version the project moves to right after `release` has been published.
pub fn next_dev_version(release: &str) -> Result<Version, ReleaseError> {
    let parsed = Version::parse(release)?;
    Ok(Version::new(parsed.major, parsed.minor, next_micro(&parsed)?))
}

pub fn strip_version_prefix(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}
