//! Federated merge of per-source pages.
//!
//! Each round takes what every active source returned, interleaves it by the merge key,
//! keeps the first `size` entities and works out where each source resumes next time.
//! Sub-cursors are start positions: the value stored for a source names the first entity
//! that source should return on the next round.
//!
//! A source that answers with no entities but a next cursor has skipped a gap. Its
//! position moves to that cursor and the round emits nothing, since the entity waiting
//! behind the gap may rank ahead of anything the other sources returned.
//!
//! The merge is a pure function of its input. Arrival order of the backend calls never
//! reaches it.

use std::collections::HashSet;

use crate::continuation::{ContinuationFactory, ContinuationKey};
use crate::cursor::{CombinedCursor, COMPLETED};

/// One source's contribution to one merge round.
#[derive(Debug, Clone)]
pub struct SourceRound<T> {
    pub source_id: String,
    /// Sub-cursor the source was queried with. `None` on first contact.
    pub cursor_in: Option<String>,
    /// Entities in the source's own order.
    pub entities: Vec<T>,
    /// `None` means the backend has nothing after this round.
    pub backend_next_cursor: Option<String>,
}

impl<T> SourceRound<T> {
    /// A round for a source that is already exhausted and was not queried.
    pub fn completed(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            cursor_in: Some(COMPLETED.to_string()),
            entities: Vec::new(),
            backend_next_cursor: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.cursor_in.as_deref() == Some(COMPLETED)
    }
}

#[derive(Debug, Clone)]
pub struct MergedPage<T> {
    pub entities: Vec<T>,
    /// Per-source positions after this page.
    pub cursor: CombinedCursor,
    /// Serialized `cursor`, or `None` once every source is completed.
    pub next_cursor: Option<String>,
}

/// Merge one round of per-source results into a single page of at most `size` entities.
///
/// `merge_key` orders entities across sources. `resume_key` produces the token a source
/// understands as its own resume position; it may be the same factory.
pub fn merge_page<T>(
    size: usize,
    sources: Vec<SourceRound<T>>,
    merge_key: &dyn ContinuationFactory<T>,
    resume_key: &dyn ContinuationFactory<T>,
) -> MergedPage<T> {
    let mut cursor = CombinedCursor::new();
    let source_ids: Vec<String> = sources.iter().map(|s| s.source_id.clone()).collect();

    let (finished, active): (Vec<_>, Vec<_>) =
        sources.into_iter().partition(SourceRound::is_completed);
    for s in &finished {
        cursor.mark_completed(s.source_id.clone());
    }

    // A source that skipped a gap has an unknown next key, so nothing else may be emitted
    // ahead of it this round. Only the gapped sources move.
    let gapped = active.iter().any(|s| s.entities.is_empty() && backend_next(s).is_some());

    // (key, source index, entity index); the index tail keeps equal keys deterministic
    let mut ranked: Vec<(ContinuationKey, usize, usize)> = active
        .iter()
        .enumerate()
        .flat_map(|(si, s)| {
            s.entities
                .iter()
                .enumerate()
                .map(move |(ei, e)| (merge_key.key(e), si, ei))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    ranked.truncate(if gapped { 0 } else { size });

    let taken: HashSet<(usize, usize)> = ranked.iter().map(|&(_, si, ei)| (si, ei)).collect();

    for (si, s) in active.iter().enumerate() {
        let last_taken = (0..s.entities.len()).rev().find(|ei| taken.contains(&(si, *ei)));
        let backend_cursor = backend_next(s);

        match last_taken {
            Some(ei) => {
                if let Some(next) = s.entities.get(ei + 1) {
                    cursor.set(s.source_id.clone(), resume_key.key(next).serialize());
                } else if let Some(next) = backend_cursor {
                    cursor.set(s.source_id.clone(), next);
                } else {
                    cursor.mark_completed(s.source_id.clone());
                }
            }
            // nothing to rank this round: follow the backend past the gap
            None if s.entities.is_empty() => match backend_cursor {
                Some(next) => cursor.set(s.source_id.clone(), next),
                None => cursor.mark_completed(s.source_id.clone()),
            },
            // out-ranked this round: retry from the same position
            None => {
                if let Some(c) = &s.cursor_in {
                    cursor.set(s.source_id.clone(), c.clone());
                }
            }
        }
    }

    let mut slots: Vec<Vec<Option<T>>> = active
        .into_iter()
        .map(|s| s.entities.into_iter().map(Some).collect())
        .collect();
    let entities: Vec<T> = ranked
        .iter()
        .filter_map(|&(_, si, ei)| slots[si][ei].take())
        .collect();

    let next_cursor = if source_ids.iter().all(|id| cursor.is_completed(id)) {
        None
    } else {
        Some(cursor.serialize())
    };

    MergedPage { entities, cursor, next_cursor }
}

/// An empty token carries no position; the backend has nothing after it.
fn backend_next<T>(s: &SourceRound<T>) -> Option<&str> {
    s.backend_next_cursor.as_deref().filter(|c| !c.is_empty())
}
