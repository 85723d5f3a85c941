//! Aggregate character totals and the resolved-name cache.

use super::Repository;
use crate::domain::{Affiliation, CharacterId, CharacterTotals, Decimal};
use chrono::DateTime;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::warn;

impl Repository {
    /// Load the aggregate rows for the given characters. Characters
    /// without a row yet are simply absent from the result.
    pub async fn get_characters(
        &self,
        ids: &[CharacterId],
    ) -> Result<Vec<CharacterTotals>, sqlx::Error> {
        let mut totals = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                r#"
                SELECT character_id, corporation_id, alliance_id,
                       received, received_isk, received_30, received_isk_30,
                       donated, donated_isk, donated_30, donated_isk_30,
                       last_donated, last_received, good_standing
                FROM characters
                WHERE character_id = ?
                "#,
            )
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                totals.push(row_to_totals(&row));
            }
        }
        Ok(totals)
    }

    /// Resolved display name for an ID, if cached.
    pub async fn get_name(&self, id: i64) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT name FROM names WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("name")))
    }

    /// All-time ISK one character has donated to another, across both
    /// direct transfers and settled contracts.
    ///
    /// Amounts are summed in Rust to preserve decimal precision;
    /// SQLite's SUM aggregate returns REAL.
    pub async fn sum_donated_between(
        &self,
        donator: CharacterId,
        receiver: CharacterId,
    ) -> Result<Decimal, sqlx::Error> {
        let mut sum = Decimal::zero();

        let rows = sqlx::query("SELECT amount FROM donations WHERE donator = ? AND receiver = ?")
            .bind(donator.as_i64())
            .bind(receiver.as_i64())
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            sum += parse_decimal(row, "amount", donator.as_i64());
        }

        let rows = sqlx::query("SELECT value FROM contracts WHERE donator = ? AND receiver = ?")
            .bind(donator.as_i64())
            .bind(receiver.as_i64())
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            sum += parse_decimal(row, "value", donator.as_i64());
        }

        Ok(sum)
    }

    pub(super) async fn upsert_character_tx(
        tx: &mut Transaction<'_, Sqlite>,
        row: &CharacterTotals,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO characters
            (character_id, corporation_id, alliance_id,
             received, received_isk, received_30, received_isk_30,
             donated, donated_isk, donated_30, donated_isk_30,
             last_donated, last_received, good_standing)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(character_id) DO UPDATE SET
                corporation_id = excluded.corporation_id,
                alliance_id = excluded.alliance_id,
                received = excluded.received,
                received_isk = excluded.received_isk,
                received_30 = excluded.received_30,
                received_isk_30 = excluded.received_isk_30,
                donated = excluded.donated,
                donated_isk = excluded.donated_isk,
                donated_30 = excluded.donated_30,
                donated_isk_30 = excluded.donated_isk_30,
                last_donated = excluded.last_donated,
                last_received = excluded.last_received,
                good_standing = excluded.good_standing
            "#,
        )
        .bind(row.character_id.as_i64())
        .bind(row.corporation_id)
        .bind(row.alliance_id)
        .bind(row.received)
        .bind(row.received_isk.to_canonical_string())
        .bind(row.received_30)
        .bind(row.received_isk_30.to_canonical_string())
        .bind(row.donated)
        .bind(row.donated_isk.to_canonical_string())
        .bind(row.donated_30)
        .bind(row.donated_isk_30.to_canonical_string())
        .bind(row.last_donated.map(|t| t.timestamp()))
        .bind(row.last_received.map(|t| t.timestamp()))
        .bind(row.good_standing as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// Flatten resolved affiliations into the (id, name) pairs to cache.
pub fn affiliation_names(affiliations: &[Affiliation]) -> Vec<crate::domain::NamedId> {
    let mut names = Vec::new();
    for affiliation in affiliations {
        for named in [
            &affiliation.character,
            &affiliation.corporation,
            &affiliation.alliance,
        ]
        .into_iter()
        .flatten()
        {
            if !names.contains(named) {
                names.push(named.clone());
            }
        }
    }
    names
}

fn parse_decimal(row: &sqlx::sqlite::SqliteRow, column: &str, key: i64) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(key, column, value = %raw, error = %e, "Failed to parse stored decimal, using default");
        Decimal::default()
    })
}

fn row_to_totals(row: &sqlx::sqlite::SqliteRow) -> CharacterTotals {
    let character_id: i64 = row.get("character_id");
    let last_donated: Option<i64> = row.get("last_donated");
    let last_received: Option<i64> = row.get("last_received");
    let good_standing: i64 = row.get("good_standing");

    CharacterTotals {
        character_id: CharacterId::new(character_id),
        corporation_id: row.get("corporation_id"),
        alliance_id: row.get("alliance_id"),
        received: row.get("received"),
        received_isk: parse_decimal(row, "received_isk", character_id),
        received_30: row.get("received_30"),
        received_isk_30: parse_decimal(row, "received_isk_30", character_id),
        donated: row.get("donated"),
        donated_isk: parse_decimal(row, "donated_isk", character_id),
        donated_30: row.get("donated_30"),
        donated_isk_30: parse_decimal(row, "donated_isk_30", character_id),
        last_donated: last_donated.and_then(|t| DateTime::from_timestamp(t, 0)),
        last_received: last_received.and_then(|t| DateTime::from_timestamp(t, 0)),
        good_standing: good_standing != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use crate::domain::{Contract, Donation, NamedId, Participant};
    use chrono::{TimeZone, Utc};

    fn participant() -> Participant {
        Participant::new(CharacterId::new(1), "hash".into(), "refresh".into())
    }

    #[tokio::test]
    async fn test_character_totals_roundtrip() {
        let (repo, _temp) = setup_test_db().await;

        let mut row = CharacterTotals::new(CharacterId::new(1));
        row.corporation_id = Some(100);
        row.add_received(
            Decimal::from_str("123.45").unwrap(),
            Utc.timestamp_opt(1000, 0).unwrap(),
        );
        row.good_standing = true;

        repo.persist_cycle(&participant(), &[], &[], &[], &[], &[row.clone()])
            .await
            .unwrap();

        let loaded = repo.get_characters(&[CharacterId::new(1)]).await.unwrap();
        assert_eq!(loaded, vec![row]);
    }

    #[tokio::test]
    async fn test_get_characters_skips_unknown() {
        let (repo, _temp) = setup_test_db().await;
        let loaded = repo
            .get_characters(&[CharacterId::new(1), CharacterId::new(2)])
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_name_cache_upsert() {
        let (repo, _temp) = setup_test_db().await;

        let names = vec![NamedId {
            id: 100,
            name: "Old Corp".into(),
        }];
        repo.persist_cycle(&participant(), &[], &[], &[], &names, &[])
            .await
            .unwrap();

        let renamed = vec![NamedId {
            id: 100,
            name: "New Corp".into(),
        }];
        repo.persist_cycle(&participant(), &[], &[], &[], &renamed, &[])
            .await
            .unwrap();

        assert_eq!(repo.get_name(100).await.unwrap(), Some("New Corp".into()));
    }

    #[tokio::test]
    async fn test_sum_donated_between_spans_both_record_kinds() {
        let (repo, _temp) = setup_test_db().await;
        let donator = CharacterId::new(2);
        let receiver = CharacterId::new(1);

        let donation = Donation::new(
            1,
            donator,
            receiver,
            Utc.timestamp_opt(1000, 0).unwrap(),
            String::new(),
            Decimal::from_str("10.5").unwrap(),
        );
        let contract = Contract {
            contract_id: 7,
            donator,
            receiver,
            location: 60003760,
            issued: Utc.timestamp_opt(1000, 0).unwrap(),
            expires: Utc.timestamp_opt(2000, 0).unwrap(),
            accepted: true,
            value: Decimal::from_str("4.5").unwrap(),
            note: String::new(),
            items: Vec::new(),
        };
        repo.persist_cycle(&participant(), &[donation], &[contract], &[], &[], &[])
            .await
            .unwrap();

        let sum = repo.sum_donated_between(donator, receiver).await.unwrap();
        assert_eq!(sum, Decimal::from(15));

        // opposite direction is untouched
        let reverse = repo.sum_donated_between(receiver, donator).await.unwrap();
        assert_eq!(reverse, Decimal::zero());
    }

    #[test]
    fn test_affiliation_names_flattens_and_dedupes() {
        let corp = NamedId {
            id: 100,
            name: "Corp".into(),
        };
        let a = Affiliation {
            character: Some(NamedId {
                id: 1,
                name: "Pilot".into(),
            }),
            corporation: Some(corp.clone()),
            alliance: None,
        };
        let b = Affiliation {
            character: Some(NamedId {
                id: 2,
                name: "Other".into(),
            }),
            corporation: Some(corp),
            alliance: None,
        };

        let names = affiliation_names(&[a, b]);
        let ids: Vec<i64> = names.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 100, 2]);
    }
}
