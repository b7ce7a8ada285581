//! Stock adjustments driven by order placement, cancellation and return.

use std::str::FromStr;

use common::MedicineId;
use serde::{Deserialize, Serialize};
use store::{StockChange, StockLedger, StoreError};

use crate::error::DomainError;
use crate::order::OrderLineItem;

/// Why stock is being adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Items leave stock when an order is placed.
    Order,
    /// Items come back when an order is cancelled.
    Cancellation,
    /// Items come back when a delivered order is returned.
    Return,
}

impl AdjustmentReason {
    /// Returns the signed delta for `quantity` units.
    pub fn delta(&self, quantity: u32) -> i64 {
        match self {
            AdjustmentReason::Order => -i64::from(quantity),
            AdjustmentReason::Cancellation | AdjustmentReason::Return => i64::from(quantity),
        }
    }

    /// Returns the reason name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Order => "order",
            AdjustmentReason::Cancellation => "cancellation",
            AdjustmentReason::Return => "return",
        }
    }
}

/// How a multi-item adjustment behaves when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdjustmentMode {
    /// Every item is adjusted or none is.
    #[default]
    Transactional,
    /// Items are adjusted one by one; failures are reported, not rolled back.
    BestEffort,
}

impl FromStr for AdjustmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactional" => Ok(AdjustmentMode::Transactional),
            "best-effort" | "best_effort" => Ok(AdjustmentMode::BestEffort),
            other => Err(format!("unknown stock adjustment mode: {other}")),
        }
    }
}

/// One stock change that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub medicine_id: MedicineId,
    pub delta: i64,
    /// Stock level after the change.
    pub stock_level: u32,
}

/// One stock change that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAdjustment {
    pub medicine_id: MedicineId,
    pub delta: i64,
    pub reason: String,
}

/// Outcome of adjusting stock for a set of order items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReport {
    pub applied: Vec<AppliedAdjustment>,
    pub failed: Vec<FailedAdjustment>,
}

impl AdjustmentReport {
    /// Returns true if every change went through.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the medicines whose change was refused.
    pub fn failed_medicines(&self) -> Vec<MedicineId> {
        self.failed.iter().map(|f| f.medicine_id.clone()).collect()
    }

    /// Returns the changes that undo everything applied.
    pub fn compensation(&self) -> Vec<StockChange> {
        self.applied
            .iter()
            .map(|a| StockChange::new(a.medicine_id.clone(), -a.delta))
            .collect()
    }
}

/// Builds the stock changes for a set of order items.
pub fn stock_changes<'a>(
    items: impl IntoIterator<Item = &'a OrderLineItem>,
    reason: AdjustmentReason,
) -> Vec<StockChange> {
    items
        .into_iter()
        .map(|item| StockChange::new(item.medicine_id.clone(), reason.delta(item.quantity)))
        .collect()
}

/// Applies stock changes through a [`StockLedger`].
///
/// Every single adjustment is an atomic conditional update in the ledger, so
/// concurrent orders can never take the same units twice.
#[derive(Clone)]
pub struct InventoryAdjuster<L: StockLedger> {
    ledger: L,
}

impl<L: StockLedger> InventoryAdjuster<L> {
    /// Creates an adjuster over the given ledger.
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Returns the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Applies `stock += delta` for one medicine and returns the new level.
    #[tracing::instrument(skip(self, reason), fields(reason = reason.as_str()))]
    pub async fn adjust(
        &self,
        medicine_id: &MedicineId,
        delta: i64,
        reason: AdjustmentReason,
    ) -> Result<u32, DomainError> {
        match self.ledger.adjust(medicine_id, delta).await {
            Ok(level) => {
                metrics::counter!("inventory_adjustments_total", "reason" => reason.as_str())
                    .increment(1);
                Ok(level)
            }
            Err(e) => {
                metrics::counter!("inventory_adjustment_failures_total").increment(1);
                Err(e.into())
            }
        }
    }

    /// Adjusts stock for every item of an order.
    ///
    /// In transactional mode a refused change aborts the whole set and is
    /// returned as an error. In best-effort mode each item is adjusted on its
    /// own and refusals are listed in the report.
    pub async fn apply_order<'a>(
        &self,
        items: impl IntoIterator<Item = &'a OrderLineItem>,
        reason: AdjustmentReason,
        mode: AdjustmentMode,
    ) -> Result<AdjustmentReport, DomainError> {
        let changes = stock_changes(items, reason);
        self.apply_changes(&changes, reason, mode).await
    }

    /// Applies a prepared set of changes.
    #[tracing::instrument(
        skip(self, changes, reason, mode),
        fields(count = changes.len(), reason = reason.as_str(), mode = ?mode)
    )]
    pub async fn apply_changes(
        &self,
        changes: &[StockChange],
        reason: AdjustmentReason,
        mode: AdjustmentMode,
    ) -> Result<AdjustmentReport, DomainError> {
        if changes.is_empty() {
            return Ok(AdjustmentReport::default());
        }

        let report = match mode {
            AdjustmentMode::Transactional => self.apply_all(changes).await?,
            AdjustmentMode::BestEffort => self.apply_each(changes).await,
        };

        metrics::counter!("inventory_adjustments_total", "reason" => reason.as_str())
            .increment(report.applied.len() as u64);

        if !report.is_complete() {
            metrics::counter!("inventory_adjustment_failures_total")
                .increment(report.failed.len() as u64);
            tracing::warn!(
                applied = report.applied.len(),
                failed = report.failed.len(),
                "Partial stock adjustment"
            );
        }

        Ok(report)
    }

    async fn apply_all(&self, changes: &[StockChange]) -> Result<AdjustmentReport, DomainError> {
        let levels = match self.ledger.adjust_all(changes).await {
            Ok(levels) => levels,
            Err(e) => {
                metrics::counter!("inventory_adjustment_failures_total").increment(1);
                return Err(e.into());
            }
        };

        let applied = changes
            .iter()
            .zip(levels)
            .map(|(change, stock_level)| AppliedAdjustment {
                medicine_id: change.medicine_id.clone(),
                delta: change.delta,
                stock_level,
            })
            .collect();

        Ok(AdjustmentReport {
            applied,
            failed: Vec::new(),
        })
    }

    async fn apply_each(&self, changes: &[StockChange]) -> AdjustmentReport {
        let mut report = AdjustmentReport::default();

        for change in changes {
            match self.ledger.adjust(&change.medicine_id, change.delta).await {
                Ok(stock_level) => report.applied.push(AppliedAdjustment {
                    medicine_id: change.medicine_id.clone(),
                    delta: change.delta,
                    stock_level,
                }),
                Err(e) => {
                    if matches!(e, StoreError::Database(_)) {
                        tracing::error!(medicine_id = %change.medicine_id, error = %e, "Stock adjustment failed");
                    }
                    report.failed.push(FailedAdjustment {
                        medicine_id: change.medicine_id.clone(),
                        delta: change.delta,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
