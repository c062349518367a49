pub mod http;
pub mod memory;

use async_trait::async_trait;

/// One page as answered by a source backend.
#[derive(Debug, Clone)]
pub struct SourcePage<T> {
    pub entities: Vec<T>,
    /// `None` is the backend's authoritative "nothing more" signal.
    pub next_cursor: Option<String>,
    /// Backend's own total, when it reports one.
    pub total: Option<u64>,
}

impl<T> SourcePage<T> {
    pub fn empty() -> Self {
        Self { entities: Vec::new(), next_cursor: None, total: None }
    }
}

/// Abstraction for a paginated per-chain marketplace backend.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetch up to `size` entities starting at `cursor` (first page when `None`).
    async fn query(&self, cursor: Option<&str>, size: usize) -> anyhow::Result<SourcePage<T>>;
}

pub use http::HttpPageSource;
pub use memory::MemorySource;
