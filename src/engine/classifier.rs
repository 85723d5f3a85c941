//! Classification of raw ledger records into donation facts.

use crate::datasource::{ContractEntry, ContractKind, ContractStatus, JournalEntry};
use crate::domain::{Donation, Participant};

/// Journal classification result: the donation facts extracted plus the
/// new watermark.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    pub donations: Vec<Donation>,
    /// ID of the newest entry fetched, recorded before filtering so the
    /// watermark always reflects what was seen, not what was kept.
    pub newest_id: Option<i64>,
}

/// Walk timestamp-descending journal entries, stopping at the stored
/// cursor; keep direct donations addressed to the participant.
///
/// Everything at or past the cursor in iteration order is already seen.
/// Transfers the participant sent are picked up when the other party is
/// polled as a participant itself.
pub fn classify_journal(entries: &[JournalEntry], participant: &Participant) -> JournalBatch {
    let newest_id = entries.first().map(|e| e.id);

    let mut donations = Vec::new();
    for entry in entries {
        if participant.last_journal_id == Some(entry.id) {
            break;
        }
        if entry.is_player_donation() && entry.second_party_id == participant.character_id {
            donations.push(Donation::new(
                entry.id,
                entry.first_party_id,
                participant.character_id,
                entry.date,
                entry.reason.clone(),
                entry.amount,
            ));
        }
    }

    JournalBatch {
        donations,
        newest_id,
    }
}

/// Contract classification result.
#[derive(Debug, Clone)]
pub struct ContractBatch {
    /// Zero-ISK item exchanges not seen before: valuate and insert.
    pub fresh: Vec<ContractEntry>,
    /// Known outstanding contracts whose status left `outstanding`:
    /// flip the accepted flag, do not re-apply value.
    pub updated: Vec<ContractEntry>,
    pub newest_id: Option<i64>,
}

/// Walk issue-date-descending contract entries. Entries ahead of the
/// stored cursor are new; at and past it, contracts we still track as
/// outstanding are re-examined for an acceptance flip.
pub fn classify_contracts(
    entries: &[ContractEntry],
    last_contract_id: Option<i64>,
    outstanding: &[i64],
) -> ContractBatch {
    let newest_id = entries.first().map(|e| e.contract_id);

    let mut fresh = Vec::new();
    let mut updated = Vec::new();
    let mut ahead_of_cursor = true;

    for entry in entries {
        if last_contract_id == Some(entry.contract_id) {
            ahead_of_cursor = false;
        }
        if entry.kind != ContractKind::ItemExchange || !entry.price.is_zero() {
            continue;
        }
        if ahead_of_cursor {
            fresh.push(entry.clone());
        } else if outstanding.contains(&entry.contract_id)
            && entry.status != ContractStatus::Outstanding
        {
            updated.push(entry.clone());
        }
    }

    ContractBatch {
        fresh,
        updated,
        newest_id,
    }
}
