use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::continuation::{
    ChronoIdFactory, ContinuationFactory, IdOnlyFactory, Identified, Priced, Timestamped,
    UsdPriceIdFactory,
};

/// A marketplace listing as returned by a chain backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub id: String,
    pub chain: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub currency_id: String,
    pub native_price: Decimal,
    #[serde(default)]
    pub usd_price: Option<Decimal>,
}

impl Identified for MarketOrder {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Timestamped for MarketOrder {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Priced for MarketOrder {
    fn currency_id(&self) -> &str {
        &self.currency_id
    }

    fn native_price(&self) -> Decimal {
        self.native_price
    }

    fn usd_price(&self) -> Option<Decimal> {
        self.usd_price
    }
}

/// Orderings a federated listing can be browsed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    CreatedDesc,
    CreatedAsc,
    PriceAsc,
    PriceDesc,
    Id,
}

impl SortOrder {
    /// Key used both to interleave sources and as each source's resume token.
    pub fn factory<T>(self) -> Arc<dyn ContinuationFactory<T>>
    where
        T: Timestamped + Priced + 'static,
    {
        match self {
            SortOrder::CreatedDesc => Arc::new(ChronoIdFactory { ascending: false }),
            SortOrder::CreatedAsc => Arc::new(ChronoIdFactory { ascending: true }),
            SortOrder::PriceAsc => Arc::new(UsdPriceIdFactory { ascending: true }),
            SortOrder::PriceDesc => Arc::new(UsdPriceIdFactory { ascending: false }),
            SortOrder::Id => Arc::new(IdOnlyFactory),
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_desc" => Ok(SortOrder::CreatedDesc),
            "created_asc" => Ok(SortOrder::CreatedAsc),
            "price_asc" => Ok(SortOrder::PriceAsc),
            "price_desc" => Ok(SortOrder::PriceDesc),
            "id" => Ok(SortOrder::Id),
            other => anyhow::bail!("unknown sort order {other:?}"),
        }
    }
}
