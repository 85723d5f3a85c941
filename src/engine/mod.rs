//! The synchronization and valuation engine.
//!
//! Pure where possible: the fetchers own the only genuinely concurrent
//! region (page expansion), everything downstream is deterministic over
//! the merged record set.

pub mod aggregator;
pub mod classifier;
pub mod fetcher;
pub mod prices;
pub mod resolver;

pub use aggregator::{good_standing, TotalsBatch};
pub use classifier::{classify_contracts, classify_journal, ContractBatch, JournalBatch};
pub use fetcher::{fetch_contracts, fetch_journal};
pub use prices::PriceTable;
pub use resolver::{gather_affiliations, resolve_affiliation};
