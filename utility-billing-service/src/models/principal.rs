//! Authenticated staff identity, supplied by the auth layer in front of us.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    BillHandler,
    MeterHandler,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::BillHandler => "bill handler",
            StaffRole::MeterHandler => "meter handler",
        }
    }

    /// Accepts both the staff table spelling ("bill handler") and snake case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', " ").as_str() {
            "admin" => Some(StaffRole::Admin),
            "bill handler" => Some(StaffRole::BillHandler),
            "meter handler" => Some(StaffRole::MeterHandler),
            _ => None,
        }
    }

    pub fn can_approve_payments(&self) -> bool {
        matches!(self, StaffRole::Admin | StaffRole::BillHandler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub role: StaffRole,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: StaffRole) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}
