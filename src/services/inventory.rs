//! Inventory hand-off: turning an accepted code into a stored item.
//!
//! The document store is an external collaborator. [`ItemStore`] is the
//! narrow create/read/update/delete/subscribe surface the app needs from it,
//! and [`InMemoryItemStore`] backs the console demo and the tests.

use crate::models::{AcceptedCode, CalibrationStatus, InventoryItem};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid calibration date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("item {0} not found")]
    NotFound(String),

    #[error("no signed-in user")]
    Unauthenticated,
}

/// Change notifications from an [`ItemStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    Created(InventoryItem),
    Updated(InventoryItem),
    Deleted(String),
}

/// The subset of a document store the inventory screens rely on.
pub trait ItemStore: Send + Sync {
    /// Store `item` under a fresh id and return the id.
    fn create(&self, item: InventoryItem) -> Result<String, InventoryError>;

    fn get(&self, id: &str) -> Result<InventoryItem, InventoryError>;

    fn update(&self, id: &str, item: InventoryItem) -> Result<(), InventoryError>;

    fn delete(&self, id: &str) -> Result<(), InventoryError>;

    /// All items, newest first.
    fn list(&self) -> Vec<InventoryItem>;

    fn subscribe(&self) -> broadcast::Receiver<ItemEvent>;
}

pub struct InMemoryItemStore {
    items: RwLock<IndexMap<String, InventoryItem>>,
    next_id: AtomicU64,
    events_tx: broadcast::Sender<ItemEvent>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            items: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            events_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore for InMemoryItemStore {
    fn create(&self, mut item: InventoryItem) -> Result<String, InventoryError> {
        let id = format!("item-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        item.id = Some(id.clone());

        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), item.clone());

        tracing::info!("Inventory item {} created for code {}", id, item.asset_code);
        let _ = self.events_tx.send(ItemEvent::Created(item));
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<InventoryItem, InventoryError> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))
    }

    fn update(&self, id: &str, mut item: InventoryItem) -> Result<(), InventoryError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let slot = items
            .get_mut(id)
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))?;

        item.id = Some(id.to_string());
        item.description_lower = item.description.to_lowercase();
        *slot = item.clone();
        drop(items);

        let _ = self.events_tx.send(ItemEvent::Updated(item));
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), InventoryError> {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(id)
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))?;

        let _ = self.events_tx.send(ItemEvent::Deleted(id.to_string()));
        Ok(())
    }

    fn list(&self) -> Vec<InventoryItem> {
        let mut items: Vec<InventoryItem> = self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps; reverse for newest first
        items.sort_by_key(|item| item.created_at);
        items.reverse();
        items
    }

    fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.events_tx.subscribe()
    }
}

/// Fields the user fills in after a code is captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItemForm {
    pub brand: String,
    pub description: String,
    /// `YYYY-MM-DD`, blank for equipment without calibration
    pub calibration_date: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub responsible_sector: Option<String>,
    pub notes: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewItemForm {
    /// Build the record for `code`, created by `user` at `now`.
    pub fn into_item(
        self,
        code: &AcceptedCode,
        user: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<InventoryItem, InventoryError> {
        let user = user
            .filter(|u| !u.trim().is_empty())
            .ok_or(InventoryError::Unauthenticated)?;

        let brand = self.brand.trim().to_string();
        if brand.is_empty() {
            return Err(InventoryError::MissingField("brand"));
        }
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(InventoryError::MissingField("description"));
        }

        let calibration_due_date = match non_blank(self.calibration_date) {
            Some(date) => Some(parse_calibration_date(&date)?),
            None => None,
        };

        Ok(InventoryItem {
            id: None,
            asset_code: code.as_str().to_string(),
            description_lower: description.to_lowercase(),
            brand,
            description,
            created_by: user.to_string(),
            created_at: now.timestamp_millis(),
            calibration_due_date,
            model: non_blank(self.model),
            serial_number: non_blank(self.serial_number),
            location: non_blank(self.location),
            responsible_sector: non_blank(self.responsible_sector),
            notes: non_blank(self.notes),
        })
    }
}

/// `YYYY-MM-DD` to epoch milliseconds at local midnight.
pub fn parse_calibration_date(text: &str) -> Result<i64, InventoryError> {
    let invalid = || InventoryError::InvalidDate(text.to_string());

    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    let local = Local
        .from_local_datetime(&midnight)
        .earliest()
        .ok_or_else(invalid)?;

    Ok(local.timestamp_millis())
}

/// Which calibration states the list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Expired,
    Valid,
}

impl StatusFilter {
    fn matches(&self, status: CalibrationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Expired => status == CalibrationStatus::Expired,
            StatusFilter::Valid => status == CalibrationStatus::Valid,
        }
    }
}

/// Items matching `search` and `filter`, in input order.
pub fn filter_items<'a>(
    items: &'a [InventoryItem],
    search: &str,
    filter: StatusFilter,
    now_ms: i64,
) -> Vec<&'a InventoryItem> {
    items
        .iter()
        .filter(|item| item.matches_search(search))
        .filter(|item| filter.matches(item.calibration_status(now_ms)))
        .collect()
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InventorySummary {
    pub total: usize,
    pub expired: usize,
    pub created_today: usize,
}

pub fn summarize(items: &[InventoryItem], now: DateTime<Local>) -> InventorySummary {
    let now_ms = now.timestamp_millis();
    let today = now.date_naive();

    InventorySummary {
        total: items.len(),
        expired: items
            .iter()
            .filter(|item| item.calibration_status(now_ms) == CalibrationStatus::Expired)
            .count(),
        created_today: items
            .iter()
            .filter(|item| {
                Local
                    .timestamp_millis_opt(item.created_at)
                    .single()
                    .is_some_and(|created| created.date_naive() == today)
            })
            .count(),
    }
}
