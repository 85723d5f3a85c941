//! Core domain types for the donation tracker.

pub mod character;
pub mod contract;
pub mod decimal;
pub mod donation;
pub mod participant;
pub mod primitives;

pub use character::{Affiliation, CharacterTotals, NamedId};
pub use contract::{Contract, ContractItem};
pub use decimal::Decimal;
pub use donation::Donation;
pub use participant::Participant;
pub use primitives::{CharacterId, TypeId};
