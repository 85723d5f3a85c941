//! Folding of classified records into per-character totals.

use crate::domain::{Affiliation, CharacterId, CharacterTotals, Contract, Decimal, Donation};
use std::collections::HashMap;

/// The set of character rows touched by one cycle, keyed by character.
///
/// Rows are loaded from storage before folding so the arithmetic is
/// additive over the persisted state; new characters start from zeroed
/// rows.
#[derive(Debug, Default)]
pub struct TotalsBatch {
    rows: HashMap<CharacterId, CharacterTotals>,
}

impl TotalsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the batch with a row loaded from storage.
    pub fn insert_existing(&mut self, row: CharacterTotals) {
        self.rows.insert(row.character_id, row);
    }

    pub fn row_mut(&mut self, id: CharacterId) -> &mut CharacterTotals {
        self.rows.entry(id).or_insert_with(|| CharacterTotals::new(id))
    }

    pub fn get(&self, id: CharacterId) -> Option<&CharacterTotals> {
        self.rows.get(&id)
    }

    /// Attach resolved organization IDs to a character's row.
    pub fn stamp_affiliation(&mut self, id: CharacterId, affiliation: &Affiliation) {
        let row = self.row_mut(id);
        if let Some(corporation) = &affiliation.corporation {
            row.corporation_id = Some(corporation.id);
        }
        if let Some(alliance) = &affiliation.alliance {
            row.alliance_id = Some(alliance.id);
        }
    }

    /// Credit both sides of a direct ISK transfer.
    pub fn apply_donation(&mut self, donation: &Donation) {
        self.row_mut(donation.donator)
            .add_donated(donation.amount, donation.timestamp);
        self.row_mut(donation.receiver)
            .add_received(donation.amount, donation.timestamp);
    }

    /// Credit both sides of a freshly settled zero-ISK contract at its
    /// estimated value.
    pub fn apply_contract(&mut self, contract: &Contract) {
        self.row_mut(contract.donator)
            .add_donated(contract.value, contract.issued);
        self.row_mut(contract.receiver)
            .add_received(contract.value, contract.issued);
    }

    /// Unwind an aged-out transfer from both parties' trailing windows.
    pub fn remove_donation(&mut self, donator: CharacterId, receiver: CharacterId, amount: Decimal) {
        self.row_mut(donator).remove_donated_30(amount);
        self.row_mut(receiver).remove_received_30(amount);
    }

    pub fn remove_contract(&mut self, donator: CharacterId, receiver: CharacterId, value: Decimal) {
        self.row_mut(donator).remove_donated_30(value);
        self.row_mut(receiver).remove_received_30(value);
    }

    pub fn character_ids(&self) -> Vec<CharacterId> {
        self.rows.keys().copied().collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &CharacterTotals> {
        self.rows.values()
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut CharacterTotals> {
        self.rows.values_mut()
    }

    pub fn into_rows(self) -> Vec<CharacterTotals> {
        self.rows.into_values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A character is in good standing when their all-time ISK donated
/// toward the configured standings character strictly exceeds the
/// required fraction of what they received in the trailing window.
pub fn good_standing(standing_donated: Decimal, received_isk_30: Decimal, ratio: Decimal) -> bool {
    standing_donated > received_isk_30 * ratio
}
