//! Priority: validated submission priority.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Submission priority. Higher values dequeue first.
///
/// Range is 1..=10 inclusive. Construction is the single validation point,
/// so a `Priority` in hand is always in range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(Error::Validation(format!(
                "priority {value} out of range {}..={}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    /// The lowest priority, matching what submitters get when they omit it.
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
