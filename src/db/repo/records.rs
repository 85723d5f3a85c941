//! Donation and contract record queries.

use super::Repository;
use crate::domain::{CharacterId, ContractItem, Decimal, Donation, TypeId};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// A stored contract row without its item lines.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRow {
    pub contract_id: i64,
    pub donator: CharacterId,
    pub receiver: CharacterId,
    pub location: i64,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub accepted: bool,
    pub value: Decimal,
    pub note: String,
}

impl Repository {
    /// Most recent donations addressed to a character.
    pub async fn donations_for_receiver(
        &self,
        receiver: CharacterId,
        limit: i64,
    ) -> Result<Vec<Donation>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, donator, receiver, timestamp, note, amount
            FROM donations
            WHERE receiver = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(receiver.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_donation).collect())
    }

    /// Contract IDs we still track as not picked up by the receiver.
    pub async fn outstanding_contract_ids(
        &self,
        receiver: CharacterId,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT contract_id
            FROM contracts
            WHERE accepted = 0 AND receiver = ?
            ORDER BY issued DESC
            LIMIT 100
            "#,
        )
        .bind(receiver.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("contract_id")).collect())
    }

    /// Item lines for one stored contract.
    pub async fn contract_items(&self, contract_id: i64) -> Result<Vec<ContractItem>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT type_id, quantity FROM contract_items WHERE contract_id = ? ORDER BY id ASC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ContractItem {
                type_id: TypeId::new(row.get("type_id")),
                quantity: row.get("quantity"),
            })
            .collect())
    }

    /// Donations older than the retention cutoff, oldest first.
    /// Batched so one sweep never stalls the scheduler for long.
    pub async fn stale_donations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Donation>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, donator, receiver, timestamp, note, amount
            FROM donations
            WHERE timestamp < ?
            ORDER BY timestamp ASC
            LIMIT 100
            "#,
        )
        .bind(cutoff.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_donation).collect())
    }

    /// Contracts issued before the retention cutoff, oldest first.
    pub async fn stale_contracts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ContractRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT contract_id, donator, receiver, location, issued, expires, accepted, value, note
            FROM contracts
            WHERE issued < ?
            ORDER BY issued ASC
            LIMIT 100
            "#,
        )
        .bind(cutoff.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_contract).collect())
    }
}

fn parse_amount(raw: &str, key: i64) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(key, amount = %raw, error = %e, "Failed to parse stored amount decimal, using default");
        Decimal::default()
    })
}

fn row_to_donation(row: &sqlx::sqlite::SqliteRow) -> Donation {
    let transaction_id: i64 = row.get("transaction_id");
    let timestamp: i64 = row.get("timestamp");
    let amount_str: String = row.get("amount");

    Donation {
        transaction_id,
        donator: CharacterId::new(row.get("donator")),
        receiver: CharacterId::new(row.get("receiver")),
        timestamp: DateTime::from_timestamp(timestamp, 0).unwrap_or_default(),
        note: row.get("note"),
        amount: parse_amount(&amount_str, transaction_id),
    }
}

fn row_to_contract(row: &sqlx::sqlite::SqliteRow) -> ContractRow {
    let contract_id: i64 = row.get("contract_id");
    let issued: i64 = row.get("issued");
    let expires: i64 = row.get("expires");
    let accepted: i64 = row.get("accepted");
    let value_str: String = row.get("value");

    ContractRow {
        contract_id,
        donator: CharacterId::new(row.get("donator")),
        receiver: CharacterId::new(row.get("receiver")),
        location: row.get("location"),
        issued: DateTime::from_timestamp(issued, 0).unwrap_or_default(),
        expires: DateTime::from_timestamp(expires, 0).unwrap_or_default(),
        accepted: accepted != 0,
        value: parse_amount(&value_str, contract_id),
        note: row.get("note"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use crate::domain::{CharacterId, Contract, ContractItem, Decimal, Donation, Participant, TypeId};
    use chrono::{Duration, TimeZone, Utc};

    fn participant() -> Participant {
        Participant::new(CharacterId::new(1), "hash".into(), "refresh".into())
    }

    fn donation(id: i64, secs: i64) -> Donation {
        Donation::new(
            id,
            CharacterId::new(2),
            CharacterId::new(1),
            Utc.timestamp_opt(secs, 0).unwrap(),
            String::new(),
            Decimal::from(100),
        )
    }

    fn contract(id: i64, issued_secs: i64, accepted: bool) -> Contract {
        Contract {
            contract_id: id,
            donator: CharacterId::new(2),
            receiver: CharacterId::new(1),
            location: 60003760,
            issued: Utc.timestamp_opt(issued_secs, 0).unwrap(),
            expires: Utc.timestamp_opt(issued_secs + 1_000_000, 0).unwrap(),
            accepted,
            value: Decimal::from(700),
            note: String::new(),
            items: vec![ContractItem {
                type_id: TypeId::new(34),
                quantity: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_donations_for_receiver_newest_first() {
        let (repo, _temp) = setup_test_db().await;
        repo.persist_cycle(
            &participant(),
            &[donation(1, 100), donation(2, 300), donation(3, 200)],
            &[],
            &[],
            &[],
            &[],
        )
        .await
        .unwrap();

        let stored = repo
            .donations_for_receiver(CharacterId::new(1), 2)
            .await
            .unwrap();
        let ids: Vec<i64> = stored.iter().map(|d| d.transaction_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_outstanding_excludes_accepted() {
        let (repo, _temp) = setup_test_db().await;
        repo.persist_cycle(
            &participant(),
            &[],
            &[contract(7, 100, false), contract(8, 200, true)],
            &[],
            &[],
            &[],
        )
        .await
        .unwrap();

        let outstanding = repo
            .outstanding_contract_ids(CharacterId::new(1))
            .await
            .unwrap();
        assert_eq!(outstanding, vec![7]);
    }

    #[tokio::test]
    async fn test_stale_queries_honor_cutoff() {
        let (repo, _temp) = setup_test_db().await;
        let now = Utc::now();
        let old = now - Duration::days(40);
        let recent = now - Duration::days(5);

        repo.persist_cycle(
            &participant(),
            &[donation(1, old.timestamp()), donation(2, recent.timestamp())],
            &[
                contract(7, old.timestamp(), false),
                contract(8, recent.timestamp(), false),
            ],
            &[],
            &[],
            &[],
        )
        .await
        .unwrap();

        let cutoff = now - Duration::days(30);
        let donations = repo.stale_donations(cutoff).await.unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].transaction_id, 1);

        let contracts = repo.stale_contracts(cutoff).await.unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].contract_id, 7);
        assert_eq!(contracts[0].value, Decimal::from(700));
    }
}
