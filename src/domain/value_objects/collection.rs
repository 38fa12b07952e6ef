use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical remote collection name (`leads`, `jobs`, `invoices`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collection(String);

impl Collection {
    pub const LEADS: &'static str = "leads";
    pub const CUSTOMERS: &'static str = "customers";
    pub const EQUIPMENT: &'static str = "equipment";
    pub const INVOICES: &'static str = "invoices";
    pub const JOB_PHOTOS: &'static str = "job_photos";

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn leads() -> Self {
        Self(Self::LEADS.to_string())
    }

    pub fn customers() -> Self {
        Self(Self::CUSTOMERS.to_string())
    }

    pub fn equipment() -> Self {
        Self(Self::EQUIPMENT.to_string())
    }

    pub fn invoices() -> Self {
        Self(Self::INVOICES.to_string())
    }

    pub fn job_photos() -> Self {
        Self(Self::JOB_PHOTOS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Collection name cannot be empty".to_string());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("Collection name contains invalid characters: {value}"));
        }
        Ok(())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Collection> for String {
    fn from(value: Collection) -> Self {
        value.0
    }
}
