//! Customer record, as far as payments and tickets need it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub account_number: String,
    #[serde(default)]
    pub meter_number: Option<String>,
    /// residential, commercial or government
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
