//! The polling scheduler.
//!
//! Each pass picks the participants most overdue for a poll and runs
//! one full cycle per participant: token refresh, journal and contract
//! fetch, classification, valuation, affiliation resolution, aggregate
//! folding, and a single atomic commit. Every N passes a pruning sweep
//! unwinds records that aged out of the retention window.

use crate::config::Config;
use crate::datasource::{ContractEntry, ContractStatus, IdentitySource, LedgerSource, TokenSource};
use crate::db::{affiliation_names, Repository};
use crate::domain::{CharacterId, Contract, ContractItem, Donation, Participant};
use crate::engine::{
    classify_contracts, classify_journal, fetch_contracts, fetch_journal, gather_affiliations,
    good_standing, PriceTable, TotalsBatch,
};
use crate::error::CycleError;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Scheduler {
    ledger: Arc<dyn LedgerSource>,
    identity: Arc<dyn IdentitySource>,
    tokens: Arc<dyn TokenSource>,
    repo: Arc<Repository>,
    prices: Arc<PriceTable>,
    config: Config,
}

impl Scheduler {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        identity: Arc<dyn IdentitySource>,
        tokens: Arc<dyn TokenSource>,
        repo: Arc<Repository>,
        prices: Arc<PriceTable>,
        config: Config,
    ) -> Self {
        Self {
            ledger,
            identity,
            tokens,
            repo,
            prices,
            config,
        }
    }

    /// Run the polling loop forever.
    pub async fn run(&self) {
        let mut iteration: u64 = 0;
        loop {
            iteration += 1;

            if let Err(err) = self.tick().await {
                warn!(error = %err, "scheduler pass failed");
            }

            if self.config.prune_every != 0 && iteration % self.config.prune_every == 0 {
                if let Err(err) = self.prune().await {
                    warn!(error = %err, "pruning sweep failed");
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }
    }

    /// One scheduler pass over the participants due for a poll.
    pub async fn tick(&self) -> Result<(), sqlx::Error> {
        let stale_before = Utc::now() - ChronoDuration::seconds(self.config.staleness_secs);
        let due = self
            .repo
            .load_due_participants(stale_before, self.config.batch_size)
            .await?;

        if due.is_empty() {
            return Ok(());
        }
        info!(participants = due.len(), "processing due participants");

        for participant in due {
            let character = participant.character_id;
            match self.process_participant(participant).await {
                Ok(()) => {}
                Err(CycleError::IdentityMismatch { character }) => {
                    // the account changed hands; stored credentials are
                    // no longer ours to use
                    warn!(%character, "owner hash changed, dropping participant");
                    self.repo.delete_participant(character).await?;
                }
                Err(err) => {
                    warn!(%character, error = %err, "participant cycle failed");
                }
            }
        }

        Ok(())
    }

    /// One full poll cycle for a single participant.
    pub async fn process_participant(
        &self,
        mut participant: Participant,
    ) -> Result<(), CycleError> {
        let grant = self
            .tokens
            .refresh(participant.character_id, &participant.refresh_token)
            .await?;
        if grant.character_id != participant.character_id
            || grant.owner_hash != participant.owner_hash
        {
            return Err(CycleError::IdentityMismatch {
                character: participant.character_id,
            });
        }
        participant.access_token = grant.access_token;
        participant.refresh_token = grant.refresh_token;
        participant.access_expires = grant.expires;

        let token = participant.access_token.clone();

        let journal_entries = fetch_journal(&self.ledger, &participant, &token).await?;
        let journal = classify_journal(&journal_entries, &participant);

        let contract_entries = fetch_contracts(&self.ledger, &participant, &token).await?;
        let outstanding = self
            .repo
            .outstanding_contract_ids(participant.character_id)
            .await?;
        let contract_batch =
            classify_contracts(&contract_entries, participant.last_contract_id, &outstanding);

        let mut contracts = Vec::with_capacity(contract_batch.fresh.len());
        for entry in &contract_batch.fresh {
            match self.settle_contract(&participant, entry, &token).await {
                Ok(contract) => contracts.push(contract),
                Err(err) => {
                    warn!(
                        contract = entry.contract_id,
                        error = %err,
                        "skipping contract, item lookup failed"
                    );
                }
            }
        }
        let accepted_ids: Vec<i64> = contract_batch
            .updated
            .iter()
            .map(|entry| entry.contract_id)
            .collect();

        let mut party_ids: Vec<CharacterId> = Vec::new();
        for donation in &journal.donations {
            for id in [donation.donator, donation.receiver] {
                if !party_ids.contains(&id) {
                    party_ids.push(id);
                }
            }
        }
        for contract in &contracts {
            for id in [contract.donator, contract.receiver] {
                if !party_ids.contains(&id) {
                    party_ids.push(id);
                }
            }
        }
        // acceptance flips carry no value, but their parties still get
        // their naming and organization linkage refreshed
        for entry in &contract_batch.updated {
            for id in [entry.issuer_id, participant.character_id] {
                if !party_ids.contains(&id) {
                    party_ids.push(id);
                }
            }
        }

        let affiliations =
            gather_affiliations(&self.identity, party_ids.iter().map(|id| id.as_i64())).await;

        let mut batch = TotalsBatch::new();
        for row in self.repo.get_characters(&party_ids).await? {
            batch.insert_existing(row);
        }
        for donation in &journal.donations {
            batch.apply_donation(donation);
        }
        for contract in &contracts {
            batch.apply_contract(contract);
        }
        for id in &party_ids {
            if let Some(affiliation) = affiliations.iter().find(|a| a.covers(id.as_i64())) {
                batch.stamp_affiliation(*id, affiliation);
            }
        }

        self.recompute_standing(&mut batch, &journal.donations, &contracts)
            .await?;

        if let Some(newest) = journal.newest_id {
            participant.advance_journal_cursor(newest);
        }
        if let Some(newest) = contract_batch.newest_id {
            participant.advance_contract_cursor(newest);
        }
        participant.last_processed = Some(Utc::now());

        let names = affiliation_names(&affiliations);
        let rows: Vec<_> = batch.into_rows();

        info!(
            character = %participant.character_id,
            donations = journal.donations.len(),
            contracts = contracts.len(),
            accepted = accepted_ids.len(),
            "committing cycle"
        );
        self.repo
            .persist_cycle(
                &participant,
                &journal.donations,
                &contracts,
                &accepted_ids,
                &names,
                &rows,
            )
            .await?;

        Ok(())
    }

    /// Turn a fresh contract entry into a settled, valuated record.
    async fn settle_contract(
        &self,
        participant: &Participant,
        entry: &ContractEntry,
        token: &str,
    ) -> Result<Contract, CycleError> {
        let items: Vec<ContractItem> = self
            .ledger
            .contract_items(participant.character_id, entry.contract_id, token)
            .await?
            .into_iter()
            .map(|item| ContractItem {
                type_id: item.type_id,
                quantity: item.quantity,
            })
            .collect();

        let value = self.prices.value(&items);
        Ok(Contract {
            contract_id: entry.contract_id,
            donator: entry.issuer_id,
            receiver: participant.character_id,
            location: entry.start_location_id,
            issued: entry.date_issued,
            expires: entry.date_expired,
            accepted: entry.status != ContractStatus::Outstanding,
            value,
            note: entry.title.clone(),
            items,
        })
    }

    /// Recompute the good-standing flag for every touched row.
    ///
    /// The persisted sum does not yet include this cycle's records, so
    /// the in-batch contribution toward the standings character is added
    /// on top.
    async fn recompute_standing(
        &self,
        batch: &mut TotalsBatch,
        donations: &[Donation],
        contracts: &[Contract],
    ) -> Result<(), sqlx::Error> {
        let standings = self.config.standings_character;

        for id in batch.character_ids() {
            let mut donated = self.repo.sum_donated_between(id, standings).await?;
            for donation in donations {
                if donation.donator == id && donation.receiver == standings {
                    donated += donation.amount;
                }
            }
            for contract in contracts {
                if contract.donator == id && contract.receiver == standings {
                    donated += contract.value;
                }
            }

            let row = batch.row_mut(id);
            row.good_standing =
                good_standing(donated, row.received_isk_30, self.config.standing_ratio);
        }

        Ok(())
    }

    /// Remove records older than the retention window and unwind their
    /// contribution from the trailing-window counters.
    pub async fn prune(&self) -> Result<(), CycleError> {
        let cutoff = Utc::now() - ChronoDuration::days(self.config.retention_days);
        let donations = self.repo.stale_donations(cutoff).await?;
        let contracts = self.repo.stale_contracts(cutoff).await?;
        if donations.is_empty() && contracts.is_empty() {
            return Ok(());
        }
        info!(
            donations = donations.len(),
            contracts = contracts.len(),
            "pruning aged-out records"
        );

        let mut party_ids: Vec<CharacterId> = Vec::new();
        for donation in &donations {
            for id in [donation.donator, donation.receiver] {
                if !party_ids.contains(&id) {
                    party_ids.push(id);
                }
            }
        }
        for contract in &contracts {
            for id in [contract.donator, contract.receiver] {
                if !party_ids.contains(&id) {
                    party_ids.push(id);
                }
            }
        }

        let mut batch = TotalsBatch::new();
        for row in self.repo.get_characters(&party_ids).await? {
            batch.insert_existing(row);
        }
        for donation in &donations {
            batch.remove_donation(donation.donator, donation.receiver, donation.amount);
        }
        for contract in &contracts {
            batch.remove_contract(contract.donator, contract.receiver, contract.value);
        }

        // standing is recomputed over what will remain after the delete
        let standings = self.config.standings_character;
        for id in batch.character_ids() {
            let mut donated = self.repo.sum_donated_between(id, standings).await?;
            for donation in &donations {
                if donation.donator == id && donation.receiver == standings {
                    donated = donated.saturating_sub(donation.amount);
                }
            }
            for contract in &contracts {
                if contract.donator == id && contract.receiver == standings {
                    donated = donated.saturating_sub(contract.value);
                }
            }
            let row = batch.row_mut(id);
            row.good_standing =
                good_standing(donated, row.received_isk_30, self.config.standing_ratio);
        }

        let donation_ids: Vec<i64> = donations.iter().map(|d| d.transaction_id).collect();
        let contract_ids: Vec<i64> = contracts.iter().map(|c| c.contract_id).collect();
        let rows: Vec<_> = batch.into_rows();

        self.repo
            .persist_prune(&donation_ids, &contract_ids, &rows)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{JournalEntry, MockSource, NameCategory};
    use crate::db::migrations::init_db;
    use crate::domain::Decimal;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut env = HashMap::new();
        env.insert("DATABASE_PATH".to_string(), "unused".to_string());
        env.insert("SSO_CLIENT_ID".to_string(), "client".to_string());
        env.insert("SSO_CLIENT_SECRET".to_string(), "secret".to_string());
        env.insert("STANDINGS_CHARACTER".to_string(), "500".to_string());
        Config::from_env_map(env).unwrap()
    }

    fn donation_entry(id: i64, from: i64, to: i64, amount: i64) -> JournalEntry {
        JournalEntry {
            id,
            ref_type: "player_donation".into(),
            first_party_id: CharacterId::new(from),
            second_party_id: CharacterId::new(to),
            amount: Decimal::from(amount),
            date: Utc.timestamp_opt(1_600_000_000 + id, 0).unwrap(),
            reason: String::new(),
        }
    }

    async fn scheduler_with(mock: MockSource) -> (Scheduler, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));

        let source = Arc::new(mock);
        let prices = Arc::new(PriceTable::new(
            source.market_prices().await.unwrap(),
            Duration::from_secs(60),
        ));
        let scheduler = Scheduler::new(
            source.clone(),
            source.clone(),
            source,
            repo.clone(),
            prices,
            config(),
        );
        (scheduler, repo, temp_dir)
    }

    fn participant(id: i64) -> Participant {
        // "mock-owner" matches what the mock token source reports
        Participant::new(CharacterId::new(id), "mock-owner".into(), "refresh".into())
    }

    #[tokio::test]
    async fn test_cycle_persists_donations_and_totals() {
        let mock = MockSource::new()
            .with_journal_pages(vec![vec![donation_entry(10, 2, 1, 500)]])
            .with_name(1, NameCategory::Character, "Receiver")
            .with_name(2, NameCategory::Character, "Donator");
        let (scheduler, repo, _temp) = scheduler_with(mock).await;

        let p = participant(1);
        repo.save_participant(&p).await.unwrap();
        scheduler.process_participant(p).await.unwrap();

        let loaded = repo
            .get_participant(CharacterId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.last_journal_id, Some(10));
        assert!(loaded.last_processed.is_some());

        let totals = repo
            .get_characters(&[CharacterId::new(1), CharacterId::new(2)])
            .await
            .unwrap();
        assert_eq!(totals.len(), 2);
        let receiver = totals.iter().find(|t| t.character_id.as_i64() == 1).unwrap();
        assert_eq!(receiver.received_isk, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_identity_mismatch_drops_participant() {
        let mock = MockSource::new().with_grant_owner_hash("someone-else");
        let (scheduler, repo, _temp) = scheduler_with(mock).await;

        repo.save_participant(&participant(1)).await.unwrap();
        scheduler.tick().await.unwrap();

        assert!(repo
            .get_participant(CharacterId::new(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cursor_unchanged() {
        let mock = MockSource::new()
            .with_journal_pages(vec![
                vec![donation_entry(50, 2, 1, 100)],
                vec![donation_entry(40, 2, 1, 100)],
                vec![donation_entry(30, 2, 1, 100)],
            ])
            .with_journal_fail_page(3)
            .with_name(1, NameCategory::Character, "Receiver")
            .with_name(2, NameCategory::Character, "Donator");
        let (scheduler, repo, _temp) = scheduler_with(mock).await;

        let p = participant(1);
        repo.save_participant(&p).await.unwrap();
        let result = scheduler.process_participant(p).await;
        assert!(result.is_err());

        let loaded = repo
            .get_participant(CharacterId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.last_journal_id, None);
        assert!(loaded.last_processed.is_none());

        let totals = repo.get_characters(&[CharacterId::new(1)]).await.unwrap();
        assert!(totals.is_empty(), "no partial aggregates may land");
    }

    #[tokio::test]
    async fn test_good_standing_requires_strict_excess_of_threshold() {
        // character 1 receives 1000, so it must pass strictly more than
        // 10 along to the standings character (500) to stand well
        let mock = MockSource::new()
            .with_journal_pages(vec![vec![donation_entry(10, 2, 1, 1000)]])
            .with_name(1, NameCategory::Character, "Receiver")
            .with_name(2, NameCategory::Character, "Donator");
        let (scheduler, repo, _temp) = scheduler_with(mock).await;

        repo.save_participant(&participant(1)).await.unwrap();
        scheduler
            .process_participant(participant(1))
            .await
            .unwrap();

        // the standings character is polled and finds exactly 10 passed
        // along: 10 > 1000 * 0.01 does not hold
        let mock = MockSource::new()
            .with_journal_pages(vec![vec![JournalEntry {
                amount: Decimal::from_str_canonical("10").unwrap(),
                ..donation_entry(11, 1, 500, 0)
            }]])
            .with_name(1, NameCategory::Character, "Receiver")
            .with_name(500, NameCategory::Character, "Standings");
        let (standings_poll, _r, _t) = scheduler_with(mock).await;
        let standings_poll = Scheduler {
            repo: repo.clone(),
            ..standings_poll
        };
        repo.save_participant(&participant(500)).await.unwrap();
        standings_poll
            .process_participant(participant(500))
            .await
            .unwrap();

        let totals = repo.get_characters(&[CharacterId::new(1)]).await.unwrap();
        assert!(!totals[0].good_standing, "exactly the threshold is not enough");

        // one more hundredth tips it over
        let mock = MockSource::new()
            .with_journal_pages(vec![vec![JournalEntry {
                amount: Decimal::from_str_canonical("0.01").unwrap(),
                ..donation_entry(12, 1, 500, 0)
            }]])
            .with_name(1, NameCategory::Character, "Receiver")
            .with_name(500, NameCategory::Character, "Standings");
        let (standings_poll, _r, _t) = scheduler_with(mock).await;
        let standings_poll = Scheduler {
            repo: repo.clone(),
            ..standings_poll
        };
        let mut p = repo
            .get_participant(CharacterId::new(500))
            .await
            .unwrap()
            .unwrap();
        p.last_journal_id = None;
        standings_poll.process_participant(p).await.unwrap();

        let totals = repo.get_characters(&[CharacterId::new(1)]).await.unwrap();
        assert!(totals[0].good_standing, "10.01 > 10 must flip the flag");
    }
}
