//! Service ticket model, status lifecycle and remarks history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
    Closed,
    Deleted,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Deleted => "deleted",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(TicketStatus::Open),
            "pending" => Some(TicketStatus::Pending),
            "resolved" => Some(TicketStatus::Resolved),
            "closed" => Some(TicketStatus::Closed),
            "deleted" => Some(TicketStatus::Deleted),
            _ => None,
        }
    }

    /// Deleted is terminal; every other move is allowed, reopening included.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        *self != TicketStatus::Deleted || next == TicketStatus::Deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(TicketPriority::Low),
            "medium" => Some(TicketPriority::Medium),
            "high" => Some(TicketPriority::High),
            "urgent" => Some(TicketPriority::Urgent),
            _ => None,
        }
    }
}

/// One staff remark. Older rows used `user`/`remarks` and carried no
/// sequence number, so those are accepted and renumbered on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemarkEntry {
    #[serde(default)]
    pub sequence: u32,
    #[serde(alias = "user")]
    pub author: String,
    #[serde(alias = "remarks")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub ticket_reference: String,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub account_number: String,
    pub category: String,
    pub subcategory: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    /// Mirrors the text of the latest remarks_history entry.
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default, deserialize_with = "deserialize_history")]
    pub remarks_history: Vec<RemarkEntry>,
    #[serde(default)]
    pub image: Option<String>,
    /// `None` for legacy rows written before versioning.
    #[serde(default)]
    pub version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// History arrives either as a JSON array or, from legacy rows, as a JSON
/// encoded string. Null and empty strings mean no history.
fn deserialize_history<'de, D>(deserializer: D) -> Result<Vec<RemarkEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Entries(Vec<RemarkEntry>),
        Encoded(String),
    }

    let mut entries = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Entries(entries)) => entries,
        Some(Raw::Encoded(s)) if !s.trim().is_empty() => {
            serde_json::from_str(&s).map_err(serde::de::Error::custom)?
        }
        _ => Vec::new(),
    };

    if entries.iter().any(|e| e.sequence == 0) {
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.sequence = i as u32 + 1;
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub ticket_reference: String,
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub account_number: String,
    pub category: String,
    pub subcategory: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub remarks_history: Vec<RemarkEntry>,
    pub image: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a caller names a ticket: by internal id or by its shared reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketLocator {
    Id(i64),
    Reference(String),
}

impl TicketLocator {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => TicketLocator::Id(id),
            Err(_) => TicketLocator::Reference(raw.to_string()),
        }
    }
}

impl fmt::Display for TicketLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketLocator::Id(id) => write!(f, "{}", id),
            TicketLocator::Reference(reference) => f.write_str(reference),
        }
    }
}

/// Partial update. A `None` field is left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketChanges {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub remark_text: Option<String>,
}

impl TicketChanges {
    pub fn remark(&self) -> Option<&str> {
        self.remark_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.remark().is_none()
    }
}

pub const TICKET_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Technical",
        &[
            "Report Leak",
            "No Water Supply",
            "Low Water Pressure",
            "Meter Problem",
            "Water Quality",
        ],
    ),
    (
        "Billing",
        &[
            "Incorrect Bill",
            "Payment Concern",
            "Request for Bill Copy",
            "Reconnection",
        ],
    ),
    (
        "Service Request",
        &[
            "New Connection",
            "Transfer of Ownership",
            "Disconnection Request",
        ],
    ),
    ("General Inquiry", &["Rates Inquiry", "Other"]),
];

pub fn ticket_categories() -> BTreeMap<&'static str, Vec<&'static str>> {
    TICKET_CATEGORIES
        .iter()
        .map(|(category, subs)| (*category, subs.to_vec()))
        .collect()
}

pub fn is_known_category(category: &str, subcategory: &str) -> bool {
    TICKET_CATEGORIES
        .iter()
        .any(|(c, subs)| *c == category && subs.contains(&subcategory))
}
