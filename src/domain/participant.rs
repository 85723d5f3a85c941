//! Tracked participants and their incremental-fetch cursors.

use super::CharacterId;
use chrono::{DateTime, Utc};

/// A tracked participant: remote-auth credentials plus the journal and
/// contract cursors bounding incremental fetches.
///
/// Cursors hold the newest record ID *observed* in a poll, not the last
/// record processed, so a repeated poll over the same data is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub character_id: CharacterId,
    pub owner_hash: String,
    pub refresh_token: String,
    pub access_token: String,
    pub access_expires: DateTime<Utc>,
    pub last_journal_id: Option<i64>,
    pub last_contract_id: Option<i64>,
    pub last_processed: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(character_id: CharacterId, owner_hash: String, refresh_token: String) -> Self {
        Self {
            character_id,
            owner_hash,
            refresh_token,
            access_token: String::new(),
            access_expires: DateTime::<Utc>::MIN_UTC,
            last_journal_id: None,
            last_contract_id: None,
            last_processed: None,
        }
    }

    /// Advance the journal cursor. Cursors only ever move forward.
    pub fn advance_journal_cursor(&mut self, newest_id: i64) {
        if self.last_journal_id.map(|cur| cur < newest_id).unwrap_or(true) {
            self.last_journal_id = Some(newest_id);
        }
    }

    /// Advance the contract cursor. Cursors only ever move forward.
    pub fn advance_contract_cursor(&mut self, newest_id: i64) {
        if self
            .last_contract_id
            .map(|cur| cur < newest_id)
            .unwrap_or(true)
        {
            self.last_contract_id = Some(newest_id);
        }
    }
}
