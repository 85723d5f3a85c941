//! Mock collaborators for testing without network calls.

use super::{
    ContractEntry, DataSourceError, IdentitySource, ItemEntry, JournalEntry, LedgerSource,
    NameCategory, NameRef, Page, PriceSheet, TokenGrant, TokenSource,
};
use crate::domain::{CharacterId, Decimal, TypeId};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;

/// Mock ledger/identity/token source returning predefined pages.
///
/// Page vectors are 1-based on the wire: index 0 of `journal_pages` is
/// what the remote serves for `page=1`. Injected page errors simulate a
/// mid-expansion transport failure.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    journal_pages: Vec<Vec<JournalEntry>>,
    contract_pages: Vec<Vec<ContractEntry>>,
    items: HashMap<i64, Vec<ItemEntry>>,
    prices: HashMap<TypeId, Decimal>,
    names: HashMap<i64, NameRef>,
    character_corporations: HashMap<i64, i64>,
    corporation_alliances: HashMap<i64, i64>,
    journal_fail_page: Option<i32>,
    contract_fail_page: Option<i32>,
    grant_owner_hash: Option<String>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal_pages(mut self, pages: Vec<Vec<JournalEntry>>) -> Self {
        self.journal_pages = pages;
        self
    }

    pub fn with_contract_pages(mut self, pages: Vec<Vec<ContractEntry>>) -> Self {
        self.contract_pages = pages;
        self
    }

    pub fn with_items(mut self, contract_id: i64, items: Vec<ItemEntry>) -> Self {
        self.items.insert(contract_id, items);
        self
    }

    pub fn with_price(mut self, type_id: TypeId, price: Decimal) -> Self {
        self.prices.insert(type_id, price);
        self
    }

    pub fn with_name(mut self, id: i64, category: NameCategory, name: &str) -> Self {
        self.names.insert(
            id,
            NameRef {
                id,
                category,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_character_corporation(mut self, character: i64, corporation: i64) -> Self {
        self.character_corporations.insert(character, corporation);
        self
    }

    pub fn with_corporation_alliance(mut self, corporation: i64, alliance: i64) -> Self {
        self.corporation_alliances.insert(corporation, alliance);
        self
    }

    /// Fail the given journal page with a server error.
    pub fn with_journal_fail_page(mut self, page: i32) -> Self {
        self.journal_fail_page = Some(page);
        self
    }

    /// Fail the given contracts page with a server error.
    pub fn with_contract_fail_page(mut self, page: i32) -> Self {
        self.contract_fail_page = Some(page);
        self
    }

    /// Make token refresh report a different owner hash than stored,
    /// simulating credential transfer.
    pub fn with_grant_owner_hash(mut self, owner_hash: &str) -> Self {
        self.grant_owner_hash = Some(owner_hash.to_string());
        self
    }

    fn page_of<T: Clone>(pages: &[Vec<T>], page: i32) -> Page<T> {
        let entries = pages
            .get((page - 1).max(0) as usize)
            .cloned()
            .unwrap_or_default();
        Page {
            entries,
            pages: pages.len().max(1) as i32,
        }
    }

    fn server_error() -> DataSourceError {
        DataSourceError::Http {
            status: 500,
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl LedgerSource for MockSource {
    async fn journal_page(
        &self,
        _character: CharacterId,
        _token: &str,
        page: i32,
    ) -> Result<Page<JournalEntry>, DataSourceError> {
        if self.journal_fail_page == Some(page) {
            return Err(Self::server_error());
        }
        Ok(Self::page_of(&self.journal_pages, page))
    }

    async fn contracts_page(
        &self,
        _character: CharacterId,
        _token: &str,
        page: i32,
    ) -> Result<Page<ContractEntry>, DataSourceError> {
        if self.contract_fail_page == Some(page) {
            return Err(Self::server_error());
        }
        Ok(Self::page_of(&self.contract_pages, page))
    }

    async fn contract_items(
        &self,
        _assignee: CharacterId,
        contract_id: i64,
        _token: &str,
    ) -> Result<Vec<ItemEntry>, DataSourceError> {
        Ok(self.items.get(&contract_id).cloned().unwrap_or_default())
    }

    async fn market_prices(&self) -> Result<PriceSheet, DataSourceError> {
        Ok(PriceSheet {
            prices: self.prices.clone(),
            expires: Utc::now() + ChronoDuration::minutes(5),
        })
    }
}

#[async_trait]
impl IdentitySource for MockSource {
    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameRef>, DataSourceError> {
        let mut out = Vec::new();
        for id in ids {
            match self.names.get(id) {
                Some(name) => out.push(name.clone()),
                None => {
                    return Err(DataSourceError::Other(format!("unknown id {}", id)));
                }
            }
        }
        Ok(out)
    }

    async fn corporation_alliance(
        &self,
        corporation: i64,
    ) -> Result<Option<i64>, DataSourceError> {
        Ok(self.corporation_alliances.get(&corporation).copied())
    }

    async fn character_corporation(
        &self,
        character: CharacterId,
    ) -> Result<i64, DataSourceError> {
        self.character_corporations
            .get(&character.as_i64())
            .copied()
            .ok_or_else(|| DataSourceError::Other(format!("unknown character {}", character)))
    }
}

#[async_trait]
impl TokenSource for MockSource {
    async fn refresh(
        &self,
        character: CharacterId,
        refresh_token: &str,
    ) -> Result<TokenGrant, DataSourceError> {
        Ok(TokenGrant {
            access_token: "mock-access".to_string(),
            refresh_token: refresh_token.to_string(),
            expires: Utc::now() + ChronoDuration::minutes(20),
            character_id: character,
            owner_hash: self
                .grant_owner_hash
                .clone()
                .unwrap_or_else(|| "mock-owner".to_string()),
        })
    }
}
