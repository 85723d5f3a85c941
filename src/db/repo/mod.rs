//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `participants.rs` - tracked-participant rows and cursors
//! - `records.rs` - donation and contract record operations
//! - `characters.rs` - aggregate totals and the name cache
//!
//! The cycle and prune commits live here because they span every table
//! and must land atomically.

mod characters;
mod participants;
mod records;

pub use characters::affiliation_names;
pub use records::ContractRow;

use crate::domain::{CharacterTotals, Contract, Donation, NamedId, Participant};
use sqlx::sqlite::SqlitePool;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Commit one participant's poll cycle atomically: new records, the
    /// acceptance flips, the refreshed aggregates and names, and the
    /// advanced cursors. If anything fails nothing lands, so a re-poll
    /// starts from the previous cursor with no partial state.
    pub async fn persist_cycle(
        &self,
        participant: &Participant,
        donations: &[Donation],
        contracts: &[Contract],
        accepted_contract_ids: &[i64],
        names: &[NamedId],
        rows: &[CharacterTotals],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for donation in donations {
            sqlx::query(
                r#"
                INSERT INTO donations (transaction_id, donator, receiver, timestamp, note, amount)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(transaction_id) DO NOTHING
                "#,
            )
            .bind(donation.transaction_id)
            .bind(donation.donator.as_i64())
            .bind(donation.receiver.as_i64())
            .bind(donation.timestamp.timestamp())
            .bind(&donation.note)
            .bind(donation.amount.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }

        for contract in contracts {
            let inserted = sqlx::query(
                r#"
                INSERT INTO contracts
                (contract_id, donator, receiver, location, issued, expires, accepted, value, note)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(contract_id) DO NOTHING
                "#,
            )
            .bind(contract.contract_id)
            .bind(contract.donator.as_i64())
            .bind(contract.receiver.as_i64())
            .bind(contract.location)
            .bind(contract.issued.timestamp())
            .bind(contract.expires.timestamp())
            .bind(contract.accepted as i64)
            .bind(contract.value.to_canonical_string())
            .bind(&contract.note)
            .execute(&mut *tx)
            .await?;

            // item lines follow the contract row; a replayed contract
            // keeps its original lines
            if inserted.rows_affected() > 0 {
                for item in &contract.items {
                    sqlx::query(
                        "INSERT INTO contract_items (contract_id, type_id, quantity) VALUES (?, ?, ?)",
                    )
                    .bind(contract.contract_id)
                    .bind(item.type_id.as_i64())
                    .bind(item.quantity)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        for contract_id in accepted_contract_ids {
            sqlx::query("UPDATE contracts SET accepted = 1 WHERE contract_id = ?")
                .bind(contract_id)
                .execute(&mut *tx)
                .await?;
        }

        for named in names {
            sqlx::query(
                r#"
                INSERT INTO names (id, name) VALUES (?, ?)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(named.id)
            .bind(&named.name)
            .execute(&mut *tx)
            .await?;
        }

        for row in rows {
            Self::upsert_character_tx(&mut tx, row).await?;
        }

        Self::upsert_participant_tx(&mut tx, participant).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Commit one pruning sweep atomically: aged-out records removed and
    /// the unwound trailing-window aggregates written back.
    pub async fn persist_prune(
        &self,
        donation_ids: &[i64],
        contract_ids: &[i64],
        rows: &[CharacterTotals],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for transaction_id in donation_ids {
            sqlx::query("DELETE FROM donations WHERE transaction_id = ?")
                .bind(transaction_id)
                .execute(&mut *tx)
                .await?;
        }

        for contract_id in contract_ids {
            sqlx::query("DELETE FROM contract_items WHERE contract_id = ?")
                .bind(contract_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM contracts WHERE contract_id = ?")
                .bind(contract_id)
                .execute(&mut *tx)
                .await?;
        }

        for row in rows {
            Self::upsert_character_tx(&mut tx, row).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_test_db;
    use crate::domain::{
        CharacterId, CharacterTotals, Contract, ContractItem, Decimal, Donation, Participant,
        TypeId,
    };
    use chrono::{TimeZone, Utc};

    fn participant() -> Participant {
        Participant::new(CharacterId::new(1), "hash".into(), "refresh".into())
    }

    fn donation(id: i64, amount: i64) -> Donation {
        Donation::new(
            id,
            CharacterId::new(2),
            CharacterId::new(1),
            Utc.timestamp_opt(1000 + id, 0).unwrap(),
            "o7".into(),
            Decimal::from(amount),
        )
    }

    fn contract(id: i64, value: i64) -> Contract {
        Contract {
            contract_id: id,
            donator: CharacterId::new(2),
            receiver: CharacterId::new(1),
            location: 60003760,
            issued: Utc.timestamp_opt(1000 + id, 0).unwrap(),
            expires: Utc.timestamp_opt(2000 + id, 0).unwrap(),
            accepted: false,
            value: Decimal::from(value),
            note: String::new(),
            items: vec![ContractItem {
                type_id: TypeId::new(34),
                quantity: 100,
            }],
        }
    }

    #[tokio::test]
    async fn test_persist_cycle_is_idempotent_for_records() {
        let (repo, _temp) = setup_test_db().await;
        let p = participant();

        let donations = vec![donation(10, 500)];
        let contracts = vec![contract(7, 700)];

        repo.persist_cycle(&p, &donations, &contracts, &[], &[], &[])
            .await
            .unwrap();
        repo.persist_cycle(&p, &donations, &contracts, &[], &[], &[])
            .await
            .unwrap();

        let stored = repo
            .donations_for_receiver(CharacterId::new(1), 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, Decimal::from(500));

        let items = repo.contract_items(7).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_cycle_flips_accepted_flag() {
        let (repo, _temp) = setup_test_db().await;
        let p = participant();

        repo.persist_cycle(&p, &[], &[contract(7, 700)], &[], &[], &[])
            .await
            .unwrap();
        let outstanding = repo
            .outstanding_contract_ids(CharacterId::new(1))
            .await
            .unwrap();
        assert_eq!(outstanding, vec![7]);

        repo.persist_cycle(&p, &[], &[], &[7], &[], &[])
            .await
            .unwrap();
        let outstanding = repo
            .outstanding_contract_ids(CharacterId::new(1))
            .await
            .unwrap();
        assert!(outstanding.is_empty());
    }

    #[tokio::test]
    async fn test_persist_prune_removes_records_and_rewrites_rows() {
        let (repo, _temp) = setup_test_db().await;
        let p = participant();

        let mut row = CharacterTotals::new(CharacterId::new(1));
        row.add_received(Decimal::from(500), Utc.timestamp_opt(1010, 0).unwrap());

        repo.persist_cycle(&p, &[donation(10, 500)], &[contract(7, 700)], &[], &[], &[row.clone()])
            .await
            .unwrap();

        row.remove_received_30(Decimal::from(500));
        repo.persist_prune(&[10], &[7], &[row]).await.unwrap();

        let stored = repo
            .donations_for_receiver(CharacterId::new(1), 10)
            .await
            .unwrap();
        assert!(stored.is_empty());
        assert!(repo.contract_items(7).await.unwrap().is_empty());

        let totals = repo.get_characters(&[CharacterId::new(1)]).await.unwrap();
        assert_eq!(totals[0].received, 1);
        assert_eq!(totals[0].received_30, 0);
    }
}
