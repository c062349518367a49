use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::continuation::ContinuationFactory;
use crate::error::CursorError;
use crate::source::{PageSource, SourcePage};

/// In-process backend over a fixed snapshot.
///
/// Entities are kept in `order`; a cursor is the serialized `order` key of the first
/// entity to return, and `next_cursor` names the first entity after the page.
///
/// With [`MemorySource::with_empty_rounds`] every page is preceded by an empty answer
/// whose cursor points back at the same position, the way a backend behaves when a
/// filter drops a whole page.
pub struct MemorySource<T> {
    entities: Vec<T>,
    tokens: Vec<String>,
    empty_rounds: bool,
}

const GAP_PREFIX: &str = "gap:";

impl<T: Clone> MemorySource<T> {
    pub fn new(mut entities: Vec<T>, order: Arc<dyn ContinuationFactory<T>>) -> Self {
        entities.sort_by(|a, b| order.key(a).cmp(&order.key(b)));
        let tokens = entities.iter().map(|e| order.key(e).serialize()).collect();
        Self { entities, tokens, empty_rounds: false }
    }

    pub fn with_empty_rounds(mut self) -> Self {
        self.empty_rounds = true;
        self
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn slice(&self, cursor: Option<&str>, size: usize) -> Result<SourcePage<T>> {
        let (position, after_gap) = match cursor.and_then(|c| c.strip_prefix(GAP_PREFIX)) {
            Some("") => (None, true),
            Some(rest) => (Some(rest), true),
            None => (cursor, false),
        };
        let start = match position {
            None => 0,
            Some(c) => self.tokens.iter().position(|t| t == c).ok_or_else(|| {
                CursorError::BadKey {
                    token: c.to_string(),
                    reason: "no such position in this source".to_string(),
                }
            })?,
        };

        if self.empty_rounds && !after_gap && start < self.entities.len() {
            return Ok(SourcePage {
                entities: Vec::new(),
                next_cursor: Some(format!("{GAP_PREFIX}{}", position.unwrap_or(""))),
                total: Some(self.entities.len() as u64),
            });
        }

        let end = (start + size).min(self.entities.len());

        Ok(SourcePage {
            entities: self.entities[start..end].to_vec(),
            next_cursor: self.tokens.get(end).filter(|_| size > 0).cloned(),
            total: Some(self.entities.len() as u64),
        })
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PageSource<T> for MemorySource<T> {
    async fn query(&self, cursor: Option<&str>, size: usize) -> Result<SourcePage<T>> {
        self.slice(cursor, size)
    }
}
