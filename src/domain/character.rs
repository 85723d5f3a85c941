//! Per-character aggregate totals and affiliation resolution results.

use super::{CharacterId, Decimal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running aggregate totals for one character, all-time plus trailing
/// 30-day twins.
///
/// Mutated only through the add/remove operations below; the 30-day
/// counters are unwound by pruning while the all-time counters only
/// ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterTotals {
    pub character_id: CharacterId,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,

    pub received: i64,
    pub received_isk: Decimal,
    pub received_30: i64,
    pub received_isk_30: Decimal,

    pub donated: i64,
    pub donated_isk: Decimal,
    pub donated_30: i64,
    pub donated_isk_30: Decimal,

    pub last_donated: Option<DateTime<Utc>>,
    pub last_received: Option<DateTime<Utc>>,

    pub good_standing: bool,
}

impl CharacterTotals {
    pub fn new(character_id: CharacterId) -> Self {
        Self {
            character_id,
            corporation_id: None,
            alliance_id: None,
            received: 0,
            received_isk: Decimal::zero(),
            received_30: 0,
            received_isk_30: Decimal::zero(),
            donated: 0,
            donated_isk: Decimal::zero(),
            donated_30: 0,
            donated_isk_30: Decimal::zero(),
            last_donated: None,
            last_received: None,
            good_standing: false,
        }
    }

    /// Fold a sent amount into the totals, advancing `last_donated`
    /// only if the record is newer than what we already saw.
    pub fn add_donated(&mut self, amount: Decimal, timestamp: DateTime<Utc>) {
        self.donated += 1;
        self.donated_isk += amount;
        self.donated_30 += 1;
        self.donated_isk_30 += amount;
        if self.last_donated.map(|t| t < timestamp).unwrap_or(true) {
            self.last_donated = Some(timestamp);
        }
    }

    /// Fold a received amount into the totals, advancing `last_received`
    /// only if the record is newer than what we already saw.
    pub fn add_received(&mut self, amount: Decimal, timestamp: DateTime<Utc>) {
        self.received += 1;
        self.received_isk += amount;
        self.received_30 += 1;
        self.received_isk_30 += amount;
        if self.last_received.map(|t| t < timestamp).unwrap_or(true) {
            self.last_received = Some(timestamp);
        }
    }

    /// Unwind an aged-out sent record from the trailing window.
    /// All-time counters are never decremented.
    pub fn remove_donated_30(&mut self, amount: Decimal) {
        self.donated_30 = (self.donated_30 - 1).max(0);
        self.donated_isk_30 = self.donated_isk_30.saturating_sub(amount);
    }

    /// Unwind an aged-out received record from the trailing window.
    pub fn remove_received_30(&mut self, amount: Decimal) {
        self.received_30 = (self.received_30 - 1).max(0);
        self.received_isk_30 = self.received_isk_30.saturating_sub(amount);
    }
}

/// A resolved (ID, display name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedId {
    pub id: i64,
    pub name: String,
}

/// Resolved naming metadata for one ID: the character (when the ID was
/// a character), its corporation, and that corporation's alliance.
///
/// Transient; only used to seed the name cache and stamp organization
/// IDs onto character rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affiliation {
    pub character: Option<NamedId>,
    pub corporation: Option<NamedId>,
    pub alliance: Option<NamedId>,
}

impl Affiliation {
    /// True when this affiliation was resolved for the given ID, either
    /// as a character or directly as a corporation.
    pub fn covers(&self, id: i64) -> bool {
        self.character.as_ref().map(|n| n.id) == Some(id)
            || self.corporation.as_ref().map(|n| n.id) == Some(id)
    }
}
