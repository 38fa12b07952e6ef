use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a job photo documents the site before or after the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoPhase {
    Before,
    After,
}

impl PhotoPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoPhase::Before => "before",
            PhotoPhase::After => "after",
        }
    }
}

impl fmt::Display for PhotoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhotoPhase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "before" => Ok(PhotoPhase::Before),
            "after" => Ok(PhotoPhase::After),
            other => Err(format!("Unknown photo phase: {other}")),
        }
    }
}
