use serde::{Deserialize, Serialize};

use crate::AnalysisError;

pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 30;
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Width of the averaging window, counted back from the latest date.
    pub days: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { days: DEFAULT_DAYS }
    }
}

impl AnalysisOptions {
    #[must_use]
    pub fn with_days(days: u32) -> Self {
        Self { days }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if (1..=MAX_DAYS).contains(&self.days) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidDays(self.days))
        }
    }
}
