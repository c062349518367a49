//! Cursor-merged pagination across independent per-chain marketplace backends.
//!
//! - [`continuation`]: totally ordered page-boundary keys and the factories that derive them
//! - [`pager`]: sort and truncate a single source's entities
//! - [`cursor`]: the combined client cursor
//! - [`merge`]: interleave one round of per-source pages into a global page
//! - [`federation`]: concurrent fan-out to the sources, then merge
//! - [`source`]: the backend contract plus HTTP and in-memory backends

pub mod config;
pub mod continuation;
pub mod cursor;
pub mod error;
pub mod federation;
pub mod merge;
pub mod pager;
pub mod source;
pub mod stats;
pub mod types;

pub use continuation::{ContinuationFactory, ContinuationKey, KeyKind};
pub use cursor::{CombinedCursor, COMPLETED};
pub use error::{CursorError, FederationError, FederationResult};
pub use federation::{FederatedPage, Federator};
pub use merge::{merge_page, MergedPage, SourceRound};
pub use source::{HttpPageSource, MemorySource, PageSource, SourcePage};
pub use stats::Stats;
pub use types::{MarketOrder, SortOrder};
