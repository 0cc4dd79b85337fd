//! Read-only order snapshots and the window they are fetched for.
//!
//! Orders come from an external store behind [`OrderSource`]; the engine
//! never mutates them.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
    Refunded,
    /// Anything else; never reportable.
    Other,
}

impl OrderStatus {
    pub fn is_reportable(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Refunded)
    }
}

/// One line of an order: a product, how many units, and what was paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: u64,
    pub quantity: u32,
    /// Pre-tax total for the whole line (all units).
    pub line_total: Decimal,
    /// Category names the product belongs to.
    pub categories: Vec<String>,
    /// True for downloads, false for shipped goods.
    pub is_virtual: bool,
    pub ean: Option<String>,
    pub upc: Option<String>,
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub status: OrderStatus,
    pub modified_at: DateTime<Utc>,
    pub shipping_country: String,
    pub shipping_postcode: String,
    pub billing_country: String,
    pub billing_postcode: String,
    pub items: Vec<LineItem>,
}

/// Inclusive date range a report covers. Always normalized so start ≤ end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportWindow {
    /// Reversed bounds are swapped silently, never an error.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start > end {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Strict interior check, used by the submission ledger.
    pub fn contains_exclusive(&self, at: DateTime<Utc>) -> bool {
        self.start < at && at < self.end
    }
}

/// External order store. Implementations must return only orders whose
/// status is completed or refunded and whose modification timestamp lies
/// within the window; the engine tolerates empty results.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch(&self, window: &ReportWindow) -> Result<Vec<Order>>;
}
