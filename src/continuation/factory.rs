use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::ContinuationKey;

/// Derives a [`ContinuationKey`] from an entity.
pub trait ContinuationFactory<T>: Send + Sync {
    fn key(&self, entity: &T) -> ContinuationKey;
}

impl<T, F> ContinuationFactory<T> for F
where
    F: Fn(&T) -> ContinuationKey + Send + Sync,
{
    fn key(&self, entity: &T) -> ContinuationKey {
        self(entity)
    }
}

pub trait Identified {
    fn id(&self) -> &str;
}

pub trait Timestamped: Identified {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

pub trait Priced: Identified {
    fn currency_id(&self) -> &str;
    fn native_price(&self) -> Decimal;
    fn usd_price(&self) -> Option<Decimal>;
}

#[derive(Debug, Clone, Copy)]
pub struct ChronoIdFactory {
    pub ascending: bool,
}

impl<T: Timestamped> ContinuationFactory<T> for ChronoIdFactory {
    fn key(&self, entity: &T) -> ContinuationKey {
        ContinuationKey::ChronoId {
            timestamp_ms: entity.timestamp().map(|t| t.timestamp_millis()),
            id: entity.id().to_string(),
            ascending: self.ascending,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UsdPriceIdFactory {
    pub ascending: bool,
}

impl<T: Priced> ContinuationFactory<T> for UsdPriceIdFactory {
    fn key(&self, entity: &T) -> ContinuationKey {
        ContinuationKey::UsdPriceId {
            currency_id: Some(entity.currency_id().to_string()),
            native_price: entity.native_price(),
            usd_price: entity.usd_price(),
            id: entity.id().to_string(),
            ascending: self.ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdOnlyFactory;

impl<T: Identified> ContinuationFactory<T> for IdOnlyFactory {
    fn key(&self, entity: &T) -> ContinuationKey {
        ContinuationKey::IdOnly { id: entity.id().to_string() }
    }
}
