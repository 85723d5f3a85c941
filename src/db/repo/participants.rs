//! Tracked-participant rows: credentials, cursors, scheduling order.

use super::Repository;
use crate::domain::{CharacterId, Participant};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};

impl Repository {
    /// Load participants due for a poll: never-processed rows first,
    /// then the ones whose last poll is older than `stale_before`.
    pub async fn load_due_participants(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Participant>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT character_id, owner_hash, refresh_token, access_token, access_expires,
                   last_journal_id, last_contract_id, last_processed
            FROM users
            WHERE last_processed IS NULL OR last_processed < ?
            ORDER BY last_processed IS NOT NULL, last_processed ASC
            LIMIT ?
            "#,
        )
        .bind(stale_before.timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_participant).collect())
    }

    pub async fn get_participant(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<Participant>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT character_id, owner_hash, refresh_token, access_token, access_expires,
                   last_journal_id, last_contract_id, last_processed
            FROM users
            WHERE character_id = ?
            "#,
        )
        .bind(character_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_participant))
    }

    /// Register or re-register a participant.
    ///
    /// When the stored owner hash differs from the new one the account
    /// changed hands, so the old row is dropped and the character starts
    /// over with fresh cursors.
    pub async fn save_participant(&self, participant: &Participant) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing_hash: Option<String> =
            sqlx::query("SELECT owner_hash FROM users WHERE character_id = ?")
                .bind(participant.character_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.get("owner_hash"));

        if let Some(hash) = existing_hash {
            if hash != participant.owner_hash {
                sqlx::query("DELETE FROM users WHERE character_id = ?")
                    .bind(participant.character_id.as_i64())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        Self::upsert_participant_tx(&mut tx, participant).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_participant(&self, character_id: CharacterId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM users WHERE character_id = ?")
            .bind(character_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(super) async fn upsert_participant_tx(
        tx: &mut Transaction<'_, Sqlite>,
        participant: &Participant,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users
            (character_id, owner_hash, refresh_token, access_token, access_expires,
             last_journal_id, last_contract_id, last_processed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(character_id) DO UPDATE SET
                owner_hash = excluded.owner_hash,
                refresh_token = excluded.refresh_token,
                access_token = excluded.access_token,
                access_expires = excluded.access_expires,
                last_journal_id = excluded.last_journal_id,
                last_contract_id = excluded.last_contract_id,
                last_processed = excluded.last_processed
            "#,
        )
        .bind(participant.character_id.as_i64())
        .bind(&participant.owner_hash)
        .bind(&participant.refresh_token)
        .bind(&participant.access_token)
        .bind(participant.access_expires.timestamp())
        .bind(participant.last_journal_id)
        .bind(participant.last_contract_id)
        .bind(participant.last_processed.map(|t| t.timestamp()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn row_to_participant(row: &sqlx::sqlite::SqliteRow) -> Participant {
    let access_expires: i64 = row.get("access_expires");
    let last_processed: Option<i64> = row.get("last_processed");

    Participant {
        character_id: CharacterId::new(row.get("character_id")),
        owner_hash: row.get("owner_hash"),
        refresh_token: row.get("refresh_token"),
        access_token: row.get("access_token"),
        access_expires: DateTime::from_timestamp(access_expires, 0).unwrap_or_default(),
        last_journal_id: row.get("last_journal_id"),
        last_contract_id: row.get("last_contract_id"),
        last_processed: last_processed.and_then(|t| DateTime::from_timestamp(t, 0)),
    }
}
