//! Alert pattern buffer
//!
//! One boolean per region, updated in place from the `pattern` string the alert
//! endpoint returns. `'A'` marks a region active, any other character inactive.

use crate::BoardError;
use crate::config::REGIONS_COUNT;
use serde::Deserialize;

/// Current alert state of every region, indexed by region id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPattern {
    regions: [bool; REGIONS_COUNT],
}

impl AlertPattern {
    /// All regions inactive
    pub const fn new() -> Self {
        Self {
            regions: [false; REGIONS_COUNT],
        }
    }

    /// Whether `region` is active; unknown regions are never active
    pub fn is_active(&self, region: usize) -> bool {
        self.regions.get(region).copied().unwrap_or(false)
    }

    pub fn regions(&self) -> &[bool] {
        &self.regions
    }

    pub fn active_count(&self) -> usize {
        self.regions.iter().filter(|&&active| active).count()
    }

    /// Apply a pattern string left to right and return how many regions it touched
    ///
    /// Only the prefix covered by `pattern` changes. Regions past its end keep
    /// their previous value, and characters past `REGIONS_COUNT` are ignored.
    pub fn apply(&mut self, pattern: &str) -> usize {
        let mut updated = 0;
        for (region, c) in self.regions.iter_mut().zip(pattern.chars()) {
            *region = c == 'A';
            updated += 1;
        }
        updated
    }
}

impl Default for AlertPattern {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the alert endpoint response, `{"pattern":"AIIA..."}`
///
/// Other fields are ignored. A body without `pattern` parses with
/// `pattern: None`, meaning "no data", not an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertPayload<'a> {
    #[serde(borrow)]
    pub pattern: Option<&'a str>,
}

impl<'a> AlertPayload<'a> {
    /// Parse a response body
    ///
    /// The pattern is borrowed from the body without unescaping, so a value
    /// with a JSON escape would shift every region after it and is rejected.
    pub fn parse(body: &'a [u8]) -> Result<Self, BoardError> {
        let (payload, _) = serde_json_core::from_slice::<AlertPayload<'a>>(body)
            .map_err(|_| BoardError::ProtocolError)?;
        match payload.pattern {
            Some(text) if text.contains('\\') => Err(BoardError::ProtocolError),
            _ => Ok(payload),
        }
    }
}
