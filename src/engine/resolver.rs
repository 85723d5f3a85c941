//! Upward identity resolution: participant -> corporation -> alliance.

use crate::datasource::{DataSourceError, IdentitySource, NameCategory};
use crate::domain::{Affiliation, CharacterId, NamedId};
use std::sync::Arc;
use tracing::warn;

/// Resolve an ID of unknown kind into an affiliation.
///
/// The initial name resolution classifies the kind and is fatal on
/// failure. Outer layers (corporation, alliance) degrade gracefully:
/// whatever resolved so far is returned with the rest left empty.
pub async fn resolve_affiliation(
    identity: &Arc<dyn IdentitySource>,
    id: i64,
) -> Result<Affiliation, DataSourceError> {
    let refs = identity.resolve_names(&[id]).await?;

    let mut aff = Affiliation::default();
    for name_ref in refs {
        match name_ref.category {
            NameCategory::Corporation => {
                aff.corporation = Some(NamedId {
                    id: name_ref.id,
                    name: name_ref.name,
                });
                aff.alliance = resolve_alliance(identity, name_ref.id).await;
            }
            NameCategory::Character => {
                let character_id = name_ref.id;
                aff.character = Some(NamedId {
                    id: character_id,
                    name: name_ref.name,
                });
                match identity
                    .character_corporation(CharacterId::new(character_id))
                    .await
                {
                    Ok(corporation) => {
                        aff.corporation = resolve_one_name(
                            identity,
                            corporation,
                            NameCategory::Corporation,
                        )
                        .await;
                        if aff.corporation.is_some() {
                            aff.alliance = resolve_alliance(identity, corporation).await;
                        }
                    }
                    Err(err) => {
                        warn!(character = character_id, error = %err, "corporation lookup failed");
                    }
                }
            }
            other => {
                warn!(id = name_ref.id, category = ?other, "unexpected id category in transfer");
            }
        }
    }

    Ok(aff)
}

/// Resolve a corporation's alliance (ID and name), or None.
async fn resolve_alliance(identity: &Arc<dyn IdentitySource>, corporation: i64) -> Option<NamedId> {
    match identity.corporation_alliance(corporation).await {
        Ok(Some(alliance)) => {
            resolve_one_name(identity, alliance, NameCategory::Alliance).await
        }
        Ok(None) => None,
        Err(err) => {
            warn!(corporation, error = %err, "alliance lookup failed");
            None
        }
    }
}

async fn resolve_one_name(
    identity: &Arc<dyn IdentitySource>,
    id: i64,
    category: NameCategory,
) -> Option<NamedId> {
    match identity.resolve_names(&[id]).await {
        Ok(refs) => refs
            .into_iter()
            .find(|r| r.category == category && r.id == id)
            .map(|r| NamedId {
                id: r.id,
                name: r.name,
            }),
        Err(err) => {
            warn!(id, error = %err, "name lookup failed");
            None
        }
    }
}

/// Resolve affiliations for every distinct ID in a batch.
///
/// IDs already covered by an earlier resolution in the same batch are
/// skipped; failed resolutions are logged and dropped so the pipeline
/// carries on without organization linkage for that party.
pub async fn gather_affiliations(
    identity: &Arc<dyn IdentitySource>,
    ids: impl IntoIterator<Item = i64>,
) -> Vec<Affiliation> {
    let mut affiliations: Vec<Affiliation> = Vec::new();
    for id in ids {
        if affiliations.iter().any(|aff| aff.covers(id)) {
            continue;
        }
        match resolve_affiliation(identity, id).await {
            Ok(aff) => affiliations.push(aff),
            Err(err) => warn!(id, error = %err, "failed to resolve affiliation"),
        }
    }
    affiliations
}
