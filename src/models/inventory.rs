use serde::{Deserialize, Serialize};

/// Calibration state of an inventory item relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    /// No due date recorded
    NotApplicable,
    Valid,
    Expired,
}

/// Registered piece of equipment.
///
/// Timestamps are epoch milliseconds, matching what the document store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub asset_code: String,
    pub brand: String,
    pub description: String,
    pub created_by: String,
    pub created_at: i64,
    pub calibration_due_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub description_lower: String,
}

impl InventoryItem {
    pub fn calibration_status(&self, now_ms: i64) -> CalibrationStatus {
        match self.calibration_due_date {
            None => CalibrationStatus::NotApplicable,
            Some(due) if due < now_ms => CalibrationStatus::Expired,
            Some(_) => CalibrationStatus::Valid,
        }
    }

    /// Case-insensitive match on asset code, brand or description.
    ///
    /// An empty term matches everything.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        self.asset_code.to_lowercase().contains(&term)
            || self.brand.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
    }
}
