//! Cursor-based paginated fetch with concurrent page expansion.
//!
//! The first page is always fetched. If the stored cursor appears in it
//! the remaining pages hold nothing new (the feed is most-recent-first).
//! Otherwise every remaining page is fetched in parallel and the whole
//! result is merged; any page failure aborts the fetch and discards all
//! partial results, leaving the cursor untouched for a clean re-scan
//! next cycle.

use crate::datasource::{ContractEntry, DataSourceError, JournalEntry, LedgerSource};
use crate::domain::Participant;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Fan out pages `2..=pages`, merging results in arrival order.
/// The first page error aborts every in-flight fetch.
async fn expand_pages<T, F, Fut>(pages: i32, fetch: F) -> Result<Vec<T>, DataSourceError>
where
    T: Send + 'static,
    F: Fn(i32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, DataSourceError>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for page in 2..=pages {
        set.spawn(fetch(page));
    }

    let mut merged = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(entries)) => merged.extend(entries),
            Ok(Err(err)) => {
                set.abort_all();
                return Err(err);
            }
            Err(err) => {
                if err.is_cancelled() {
                    continue;
                }
                set.abort_all();
                return Err(DataSourceError::Other(err.to_string()));
            }
        }
    }

    Ok(merged)
}

/// Fetch all journal entries newer than the participant's cursor,
/// sorted newest first.
pub async fn fetch_journal(
    ledger: &Arc<dyn LedgerSource>,
    participant: &Participant,
    token: &str,
) -> Result<Vec<JournalEntry>, DataSourceError> {
    let first = ledger
        .journal_page(participant.character_id, token, 1)
        .await?;
    let mut entries = first.entries;

    let cursor_in_first = participant
        .last_journal_id
        .map(|last| entries.iter().any(|e| e.id == last))
        .unwrap_or(false);

    if !cursor_in_first && first.pages > 1 {
        debug!(
            character = %participant.character_id,
            pages = first.pages,
            "journal cursor beyond first page, expanding"
        );
        let ledger = Arc::clone(ledger);
        let character = participant.character_id;
        let token = token.to_string();
        let more = expand_pages(first.pages, move |page| {
            let ledger = Arc::clone(&ledger);
            let token = token.clone();
            async move {
                ledger
                    .journal_page(character, &token, page)
                    .await
                    .map(|p| p.entries)
            }
        })
        .await?;
        entries.extend(more);
    }

    entries.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(entries)
}

/// Fetch all contract entries newer than the participant's cursor,
/// sorted newest first by issue date.
pub async fn fetch_contracts(
    ledger: &Arc<dyn LedgerSource>,
    participant: &Participant,
    token: &str,
) -> Result<Vec<ContractEntry>, DataSourceError> {
    let first = ledger
        .contracts_page(participant.character_id, token, 1)
        .await?;
    let mut entries = first.entries;

    let cursor_in_first = participant
        .last_contract_id
        .map(|last| entries.iter().any(|e| e.contract_id == last))
        .unwrap_or(false);

    if !cursor_in_first && first.pages > 1 {
        debug!(
            character = %participant.character_id,
            pages = first.pages,
            "contract cursor beyond first page, expanding"
        );
        let ledger = Arc::clone(ledger);
        let character = participant.character_id;
        let token = token.to_string();
        let more = expand_pages(first.pages, move |page| {
            let ledger = Arc::clone(&ledger);
            let token = token.clone();
            async move {
                ledger
                    .contracts_page(character, &token, page)
                    .await
                    .map(|p| p.entries)
            }
        })
        .await?;
        entries.extend(more);
    }

    entries.sort_by(|a, b| b.date_issued.cmp(&a.date_issued));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockSource;
    use crate::domain::{CharacterId, Decimal};
    use chrono::{TimeZone, Utc};

    fn entry(id: i64, secs: i64) -> JournalEntry {
        JournalEntry {
            id,
            ref_type: "player_donation".into(),
            first_party_id: CharacterId::new(2),
            second_party_id: CharacterId::new(1),
            amount: Decimal::from(10),
            date: Utc.timestamp_opt(secs, 0).unwrap(),
            reason: String::new(),
        }
    }

    fn participant() -> Participant {
        Participant::new(CharacterId::new(1), "hash".into(), "refresh".into())
    }

    fn ledger(mock: MockSource) -> Arc<dyn LedgerSource> {
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_all_pages_merged_on_first_run() {
        // 1 record on the first page, declared total of 3 pages, 1 new
        // record on each of pages 2-3.
        let mock = MockSource::new().with_journal_pages(vec![
            vec![entry(30, 300)],
            vec![entry(20, 200)],
            vec![entry(10, 100)],
        ]);
        let ledger = ledger(mock);

        let entries = fetch_journal(&ledger, &participant(), "t").await.unwrap();
        assert_eq!(entries.len(), 3);
        // newest first regardless of page arrival order
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn test_cursor_in_first_page_stops_expansion() {
        let mock = MockSource::new().with_journal_pages(vec![
            vec![entry(30, 300), entry(20, 200)],
            vec![entry(10, 100)],
        ]);
        let ledger = ledger(mock);

        let mut p = participant();
        p.last_journal_id = Some(20);

        let entries = fetch_journal(&ledger, &p, "t").await.unwrap();
        // page 2 never merged: the watermark was already visible
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_page_error_discards_partial_results() {
        let mock = MockSource::new()
            .with_journal_pages(vec![
                vec![entry(50, 500)],
                vec![entry(40, 400)],
                vec![entry(30, 300)],
                vec![entry(20, 200)],
                vec![entry(10, 100)],
            ])
            .with_journal_fail_page(3);
        let ledger = ledger(mock);

        let result = fetch_journal(&ledger, &participant(), "t").await;
        assert!(result.is_err(), "page 3 of 5 failing must abort the fetch");
    }
}
