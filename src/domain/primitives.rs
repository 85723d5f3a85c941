//! Domain primitives: CharacterId, TypeId.

use serde::{Deserialize, Serialize};

/// Character (participant) identifier on the remote ledger.
///
/// Corporations and alliances share the same ID space; a bare `i64` is
/// used for those since they are never cursor-bearing entities here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub i64);

impl CharacterId {
    pub fn new(id: i64) -> Self {
        CharacterId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item type identifier, the key into the market valuation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub i64);

impl TypeId {
    pub fn new(id: i64) -> Self {
        TypeId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
