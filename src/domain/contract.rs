//! Zero-ISK item-exchange contract facts.

use super::{CharacterId, Decimal, TypeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A zero-ISK item exchange treated as a disguised donation.
///
/// Immutable after settlement except for `accepted`, which may flip
/// false -> true once the receiver picks the contract up. `value` is
/// computed from the price table at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Remote contract ID (natural key).
    pub contract_id: i64,
    pub donator: CharacterId,
    pub receiver: CharacterId,
    /// Station or structure ID the items sit in.
    pub location: i64,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub accepted: bool,
    /// Estimated worth from the valuation cache at creation time.
    pub value: Decimal,
    pub note: String,
    pub items: Vec<ContractItem>,
}

/// A single item line within a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractItem {
    pub type_id: TypeId,
    pub quantity: i64,
}

impl Contract {
    /// Quantities summed per type; a contract may list the same type on
    /// several lines.
    pub fn item_quantities(items: &[ContractItem]) -> HashMap<TypeId, i64> {
        let mut quantities = HashMap::new();
        for item in items {
            *quantities.entry(item.type_id).or_insert(0) += item.quantity;
        }
        quantities
    }
}
