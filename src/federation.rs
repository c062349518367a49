//! Fan-out over the enabled sources, fan-in, then merge.

use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::continuation::ContinuationFactory;
use crate::cursor::{CombinedCursor, COMPLETED};
use crate::error::{CursorError, FederationError, FederationResult};
use crate::merge::{merge_page, SourceRound};
use crate::source::PageSource;
use crate::stats::Stats;

pub struct SourceEntry<T> {
    pub id: String,
    pub source: Arc<dyn PageSource<T>>,
}

#[derive(Debug, Clone)]
pub struct FederatedPage<T> {
    pub request_id: Uuid,
    pub entities: Vec<T>,
    pub cursor: CombinedCursor,
    /// Opaque cursor for the client. `None` once every source is completed.
    pub next_cursor: Option<String>,
    /// Sum of the totals the queried backends reported this round. Sources overlap in
    /// time and completed sources are not asked, so this is only an estimate.
    pub approximate_total: Option<u64>,
}

/// Queries every enabled source for one page and merges the answers.
pub struct Federator<T> {
    sources: Vec<SourceEntry<T>>,
    concurrency: usize,
    request_timeout: Option<Duration>,
    stats: Arc<Stats>,
}

impl<T: Send + 'static> Federator<T> {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            sources: Vec::new(),
            concurrency: usize::MAX,
            request_timeout: None,
            stats,
        }
    }

    pub fn with_source(mut self, id: impl Into<String>, source: Arc<dyn PageSource<T>>) -> Self {
        let id = id.into();
        debug_assert!(
            self.sources.iter().all(|s| s.id != id),
            "source {id} registered twice"
        );
        self.sources.push(SourceEntry { id, source });
        self
    }

    /// Upper bound on backend calls in flight for one page.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Fetch the page after `cursor` (`None` for the first page).
    ///
    /// Sources marked completed in the cursor are not queried. Any source failure fails
    /// the whole request and no cursor is advanced, so retrying with the same cursor is safe.
    /// A backend that rejects its sub-cursor by returning a [`CursorError`] fails the
    /// request as [`FederationError::MalformedCursor`].
    pub async fn fetch_page(
        &self,
        cursor: Option<&str>,
        size: usize,
        merge_key: &dyn ContinuationFactory<T>,
        resume_key: &dyn ContinuationFactory<T>,
    ) -> FederationResult<FederatedPage<T>> {
        if size == 0 {
            return Err(FederationError::InvalidPageSize);
        }
        let request_id = Uuid::new_v4();
        let incoming = CombinedCursor::parse_opt(cursor)?;

        let mut rounds: Vec<Option<SourceRound<T>>> = self.sources.iter().map(|_| None).collect();
        let mut pending = Vec::new();
        for (idx, entry) in self.sources.iter().enumerate() {
            match incoming.get(&entry.id) {
                Some(COMPLETED) => {
                    tracing::debug!(%request_id, source_id = %entry.id, "source completed, skipping");
                    self.stats.inc_source_skipped();
                    rounds[idx] = Some(SourceRound::completed(entry.id.clone()));
                }
                other => pending.push((idx, entry, other.map(str::to_string))),
            }
        }

        let stale: Vec<SourceRound<T>> = incoming
            .source_ids()
            .filter(|id| self.sources.iter().all(|s| s.id != *id))
            .map(|id| {
                tracing::warn!(%request_id, source_id = %id, "cursor names a source that is not enabled");
                SourceRound::completed(id)
            })
            .collect();

        let timeout = self.request_timeout;
        let stats = &self.stats;

        let mut calls = stream::iter(pending.into_iter().map(|(idx, entry, cursor_in)| async move {
            stats.inc_source_query();
            tracing::debug!(%request_id, source_id = %entry.id, cursor = ?cursor_in, size, "dispatching source query");

            let fut = entry.source.query(cursor_in.as_deref(), size);
            let res = match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!("timed out after {}ms", limit.as_millis())),
                },
                None => fut.await,
            };
            (idx, cursor_in, res)
        }))
        .buffer_unordered(self.concurrency);

        let mut approximate_total: Option<u64> = None;
        while let Some((idx, cursor_in, res)) = calls.next().await {
            let source_id = &self.sources[idx].id;
            let page = match res {
                Ok(p) => p,
                Err(e) => match e.downcast::<CursorError>() {
                    // the backend answered but did not accept the sub-cursor it was handed
                    Ok(bad) => {
                        tracing::warn!(%request_id, source_id = %source_id, error = %bad, "source rejected its sub-cursor");
                        return Err(FederationError::MalformedCursor(bad));
                    }
                    Err(e) => {
                        stats.inc_source_failure();
                        let error = format!("{e:#}");
                        tracing::warn!(%request_id, source_id = %source_id, error = %error, "source query failed");
                        return Err(FederationError::SourceUnavailable {
                            source_id: source_id.clone(),
                            source: e,
                        });
                    }
                },
            };

            if let Some(t) = page.total {
                approximate_total = Some(approximate_total.unwrap_or(0).saturating_add(t));
            }
            rounds[idx] = Some(SourceRound {
                source_id: source_id.clone(),
                cursor_in,
                entities: page.entities,
                backend_next_cursor: page.next_cursor,
            });
        }
        drop(calls);

        let sources: Vec<SourceRound<T>> = rounds.into_iter().flatten().chain(stale).collect();
        let merged = merge_page(size, sources, merge_key, resume_key);

        stats.inc_page(merged.entities.len() as u64);
        tracing::info!(
            %request_id,
            entities = merged.entities.len(),
            completed = merged.next_cursor.is_none(),
            "federated page served"
        );

        Ok(FederatedPage {
            request_id,
            entities: merged.entities,
            cursor: merged.cursor,
            next_cursor: merged.next_cursor,
            approximate_total,
        })
    }
}
