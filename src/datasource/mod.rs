//! External collaborator seams: the remote ledger, identity resolution,
//! and token refresh.
//!
//! Implementations must handle pagination metadata, retry/backoff, and
//! rate limiting; the engine only sees typed pages.

use crate::domain::{CharacterId, Decimal, TypeId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod esi;
pub mod mock;

pub use esi::{EsiSource, SsoTokenSource};
pub use mock::MockSource;

/// One page of remote records plus the total page count reported by the
/// remote ledger on the first response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub entries: Vec<T>,
    pub pages: i32,
}

/// A raw wallet journal entry as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub ref_type: String,
    pub first_party_id: CharacterId,
    pub second_party_id: CharacterId,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

impl JournalEntry {
    /// Direct player-to-player ISK transfer.
    pub fn is_player_donation(&self) -> bool {
        self.ref_type == "player_donation"
    }
}

/// Contract kind as reported by the ledger. Only item exchanges matter
/// here; everything else is carried as `Other` and filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    ItemExchange,
    #[serde(other)]
    Other,
}

/// Contract lifecycle status. `Outstanding` means not yet accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Outstanding,
    Finished,
    #[serde(other)]
    Other,
}

/// A raw contract entry as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEntry {
    pub contract_id: i64,
    pub issuer_id: CharacterId,
    pub assignee_id: CharacterId,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub status: ContractStatus,
    pub price: Decimal,
    #[serde(default)]
    pub start_location_id: i64,
    pub date_issued: DateTime<Utc>,
    pub date_expired: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
}

/// A raw contract item line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub record_id: i64,
    pub type_id: TypeId,
    pub quantity: i64,
}

/// The full reference price table plus its cache-wide expiry, as
/// declared by the remote source.
#[derive(Debug, Clone)]
pub struct PriceSheet {
    pub prices: HashMap<TypeId, Decimal>,
    pub expires: DateTime<Utc>,
}

/// Name resolution category; the remote call classifies the ID kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCategory {
    Character,
    Corporation,
    Alliance,
    #[serde(other)]
    Other,
}

/// A resolved (ID, category, name) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub id: i64,
    pub category: NameCategory,
    pub name: String,
}

/// A refreshed bearer token plus the identity-verification pair used to
/// cross-check stored participant identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires: DateTime<Utc>,
    pub character_id: CharacterId,
    pub owner_hash: String,
}

/// Paginated access to a participant's journal and contract feeds.
#[async_trait]
pub trait LedgerSource: Send + Sync + fmt::Debug {
    /// Fetch one journal page (1-based) for a character.
    async fn journal_page(
        &self,
        character: CharacterId,
        token: &str,
        page: i32,
    ) -> Result<Page<JournalEntry>, DataSourceError>;

    /// Fetch one contracts page (1-based) for a character.
    async fn contracts_page(
        &self,
        character: CharacterId,
        token: &str,
        page: i32,
    ) -> Result<Page<ContractEntry>, DataSourceError>;

    /// Fetch the item lines of one contract.
    async fn contract_items(
        &self,
        assignee: CharacterId,
        contract_id: i64,
        token: &str,
    ) -> Result<Vec<ItemEntry>, DataSourceError>;

    /// Fetch the full market price table with its expiry.
    async fn market_prices(&self) -> Result<PriceSheet, DataSourceError>;
}

/// Bulk name resolution plus upward organization lookups.
#[async_trait]
pub trait IdentitySource: Send + Sync + fmt::Debug {
    /// Resolve IDs to (category, name) pairs in one call.
    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameRef>, DataSourceError>;

    /// The alliance a corporation belongs to, if any.
    async fn corporation_alliance(&self, corporation: i64)
        -> Result<Option<i64>, DataSourceError>;

    /// The corporation a character belongs to.
    async fn character_corporation(
        &self,
        character: CharacterId,
    ) -> Result<i64, DataSourceError>;
}

/// Exchanges stored refresh credentials for a valid bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    async fn refresh(
        &self,
        character: CharacterId,
        refresh_token: &str,
    ) -> Result<TokenGrant, DataSourceError>;
}

/// Error type for all remote collaborator operations.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("rate limited")]
    RateLimited,
    #[error("{0}")]
    Other(String),
}
