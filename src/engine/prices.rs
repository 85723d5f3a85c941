//! Self-refreshing market valuation cache.

use crate::datasource::{DataSourceError, LedgerSource, PriceSheet};
use crate::domain::{Contract, ContractItem, Decimal};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// In-memory type -> reference price table with a single cache-wide
/// expiry.
///
/// The whole table is replaced atomically on refresh; readers hold the
/// lock only for the duration of one contract's summation.
#[derive(Debug)]
pub struct PriceTable {
    sheet: Mutex<PriceSheet>,
    /// Minimum refresh interval, bounding request rate even when the
    /// remote declares a shorter expiry.
    floor: Duration,
}

impl PriceTable {
    pub fn new(sheet: PriceSheet, floor: Duration) -> Self {
        Self {
            sheet: Mutex::new(sheet),
            floor,
        }
    }

    /// Valuate a contract's item set: sum of reference price times
    /// per-type summed quantity. A type without a price contributes
    /// zero; that is not an error condition.
    pub fn value(&self, items: &[ContractItem]) -> Decimal {
        let quantities = Contract::item_quantities(items);
        let sheet = self.sheet.lock().expect("price table lock poisoned");
        let mut sum = Decimal::zero();
        for (type_id, quantity) in quantities {
            if let Some(price) = sheet.prices.get(&type_id) {
                sum += *price * Decimal::from(quantity);
            }
        }
        sum
    }

    /// Atomically swap in a fresh table.
    pub fn replace(&self, sheet: PriceSheet) {
        let mut guard = self.sheet.lock().expect("price table lock poisoned");
        *guard = sheet;
    }

    /// Time until the next refresh: remaining time to the declared
    /// expiry, clamped to the floor.
    pub fn next_refresh(&self) -> Duration {
        let expires = {
            let sheet = self.sheet.lock().expect("price table lock poisoned");
            sheet.expires
        };
        let remaining = (expires - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        remaining.max(self.floor)
    }

    /// Background refresh loop. Failures keep the previous table and
    /// retry after the floor interval.
    pub async fn refresh_loop(self: Arc<Self>, ledger: Arc<dyn LedgerSource>) {
        loop {
            let dt = self.next_refresh();
            info!(seconds = dt.as_secs(), "next market price refresh");
            tokio::time::sleep(dt).await;

            match ledger.market_prices().await {
                Ok(sheet) => {
                    info!(types = sheet.prices.len(), "market prices refreshed");
                    self.replace(sheet);
                }
                Err(err) => warn!(error = %err, "failed to refresh market prices"),
            }
        }
    }
}

/// Fetch the initial price table from the remote source.
pub async fn initial_sheet(ledger: &Arc<dyn LedgerSource>) -> Result<PriceSheet, DataSourceError> {
    ledger.market_prices().await
}
