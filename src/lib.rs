pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    DataSourceError, EsiSource, IdentitySource, LedgerSource, MockSource, SsoTokenSource,
    TokenSource,
};
pub use db::{init_db, Repository};
pub use domain::{
    CharacterId, CharacterTotals, Contract, ContractItem, Decimal, Donation, Participant, TypeId,
};
pub use engine::PriceTable;
pub use error::CycleError;
pub use orchestration::Scheduler;
