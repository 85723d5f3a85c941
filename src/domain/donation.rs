//! Direct ISK transfer facts.

use super::{CharacterId, Decimal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable donation fact, keyed by the remote transaction ID.
///
/// Created by the classifier from matching journal entries; only ever
/// deleted by the pruning job once older than the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    /// Remote ledger transaction ID (globally unique natural key).
    pub transaction_id: i64,
    pub donator: CharacterId,
    pub receiver: CharacterId,
    pub timestamp: DateTime<Utc>,
    /// Memo attached to the transfer, if any.
    pub note: String,
    pub amount: Decimal,
}

impl Donation {
    pub fn new(
        transaction_id: i64,
        donator: CharacterId,
        receiver: CharacterId,
        timestamp: DateTime<Utc>,
        note: String,
        amount: Decimal,
    ) -> Self {
        Self {
            transaction_id,
            donator,
            receiver,
            timestamp,
            note,
            amount,
        }
    }
}
