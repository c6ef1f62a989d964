//! Value types shared by the telemetry entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Longest session identifier accepted from a client.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Milestone thresholds, in percent of document height.
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// A star rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, DomainError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::validation(format!(
                "rating must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let narrowed = u8::try_from(value)
            .map_err(|_| DomainError::validation(format!("rating `{value}` is out of range")))?;
        Self::new(narrowed)
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        i64::from(rating.0)
    }
}

/// Opaque identifier of one browsing session.
///
/// Clients generate it once and pass it explicitly with every telemetry
/// event; it is never tied to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts a client-supplied identifier. Blank input yields `Ok(None)`.
    pub fn parse(raw: &str) -> Result<Option<Self>, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.len() > MAX_SESSION_ID_LEN {
            return Err(DomainError::validation(format!(
                "session id exceeds {MAX_SESSION_ID_LEN} characters"
            )));
        }
        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A percentage of document height, 0 through 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ScrollPercent(u8);

impl ScrollPercent {
    pub const FULL: ScrollPercent = ScrollPercent(100);

    pub fn new(value: u8) -> Result<Self, DomainError> {
        if value <= 100 {
            Ok(Self(value))
        } else {
            Err(DomainError::validation(format!(
                "scroll percentage must be at most 100, got {value}"
            )))
        }
    }

    /// Clamps into range; used where the value is computed rather than received.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() || value <= 0.0 {
            Self(0)
        } else if value >= 100.0 {
            Self::FULL
        } else {
            Self(value.round() as u8)
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Scroll milestones reached during a visit.
///
/// Always derived from the maximum depth so a milestone can never be set
/// without the depth that implies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestones {
    pub reached25: bool,
    pub reached50: bool,
    pub reached75: bool,
    pub reached100: bool,
}

impl Milestones {
    pub fn from_depth(max_depth: ScrollPercent) -> Self {
        let depth = max_depth.get();
        Self {
            reached25: depth >= MILESTONES[0],
            reached50: depth >= MILESTONES[1],
            reached75: depth >= MILESTONES[2],
            reached100: depth >= MILESTONES[3],
        }
    }

    /// Rebuilds milestones from stored flags, rejecting combinations the
    /// depth does not support.
    pub fn from_stored(
        max_depth: ScrollPercent,
        flags: [bool; 4],
    ) -> Result<Self, DomainError> {
        let derived = Self::from_depth(max_depth);
        let stored = Self {
            reached25: flags[0],
            reached50: flags[1],
            reached75: flags[2],
            reached100: flags[3],
        };
        if stored.as_flags().iter().zip(derived.as_flags()).any(|(s, d)| *s && !d) {
            return Err(DomainError::invariant(format!(
                "milestone flags {:?} exceed max depth {}",
                flags,
                max_depth.get()
            )));
        }
        Ok(stored)
    }

    pub fn as_flags(&self) -> [bool; 4] {
        [self.reached25, self.reached50, self.reached75, self.reached100]
    }
}
