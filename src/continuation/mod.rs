pub mod factory;

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;

use crate::error::CursorError;

pub use factory::{
    ChronoIdFactory, ContinuationFactory, IdOnlyFactory, Identified, Priced, Timestamped,
    UsdPriceIdFactory,
};

/// Serialized stand-in for a missing timestamp.
const MISSING_TIMESTAMP: i64 = i64::MAX;

/// Which key variant a serialized token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    ChronoId,
    UsdPriceId,
    IdOnly,
}

/// Page-boundary value with a total order.
///
/// Direction is part of the key: a descending key compares with the sign flipped,
/// so sorting any slice of keys ascending yields the requested order.
#[derive(Debug, Clone)]
pub enum ContinuationKey {
    /// Creation time (epoch millis) then id. A missing timestamp behaves like `i64::MAX`.
    ChronoId {
        timestamp_ms: Option<i64>,
        id: String,
        ascending: bool,
    },
    /// Cross-currency price order. Only the native price is serialized.
    UsdPriceId {
        currency_id: Option<String>,
        native_price: Decimal,
        usd_price: Option<Decimal>,
        id: String,
        ascending: bool,
    },
    IdOnly { id: String },
}

impl ContinuationKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            ContinuationKey::ChronoId { .. } => KeyKind::ChronoId,
            ContinuationKey::UsdPriceId { .. } => KeyKind::UsdPriceId,
            ContinuationKey::IdOnly { .. } => KeyKind::IdOnly,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ContinuationKey::ChronoId { id, .. }
            | ContinuationKey::UsdPriceId { id, .. }
            | ContinuationKey::IdOnly { id } => id,
        }
    }

    /// Canonical token handed to the originating source as its resume position.
    pub fn serialize(&self) -> String {
        match self {
            ContinuationKey::ChronoId { timestamp_ms, id, .. } => {
                format!("{}_{}", timestamp_ms.unwrap_or(MISSING_TIMESTAMP), id)
            }
            ContinuationKey::UsdPriceId { native_price, id, .. } => {
                format!("{}_{}", native_price, id)
            }
            ContinuationKey::IdOnly { id } => id.clone(),
        }
    }

    /// Parse a token produced by [`ContinuationKey::serialize`].
    ///
    /// Price tokens carry neither currency nor USD price, so the parsed key only
    /// knows the native price and id.
    pub fn parse(kind: KeyKind, token: &str, ascending: bool) -> Result<Self, CursorError> {
        let bad = |reason: &str| CursorError::BadKey {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        match kind {
            KeyKind::ChronoId => {
                let (ts, id) = token.split_once('_').ok_or_else(|| bad("missing '_'"))?;
                let ts: i64 = ts.parse().map_err(|_| bad("timestamp is not an integer"))?;
                if id.is_empty() {
                    return Err(bad("empty id"));
                }
                Ok(ContinuationKey::ChronoId {
                    timestamp_ms: (ts != MISSING_TIMESTAMP).then_some(ts),
                    id: id.to_string(),
                    ascending,
                })
            }
            KeyKind::UsdPriceId => {
                let (px, id) = token.split_once('_').ok_or_else(|| bad("missing '_'"))?;
                let native_price: Decimal = px.parse().map_err(|_| bad("price is not a decimal"))?;
                if id.is_empty() {
                    return Err(bad("empty id"));
                }
                Ok(ContinuationKey::UsdPriceId {
                    currency_id: None,
                    native_price,
                    usd_price: None,
                    id: id.to_string(),
                    ascending,
                })
            }
            KeyKind::IdOnly => {
                if token.is_empty() {
                    return Err(bad("empty id"));
                }
                Ok(ContinuationKey::IdOnly { id: token.to_string() })
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ContinuationKey::ChronoId { .. } => 0,
            ContinuationKey::UsdPriceId { .. } => 1,
            ContinuationKey::IdOnly { .. } => 2,
        }
    }

    fn ascending(&self) -> bool {
        match self {
            ContinuationKey::ChronoId { ascending, .. }
            | ContinuationKey::UsdPriceId { ascending, .. } => *ascending,
            ContinuationKey::IdOnly { .. } => true,
        }
    }
}

fn directed(ord: Ordering, ascending: bool) -> Ordering {
    if ascending { ord } else { ord.reverse() }
}

/// Present values first, missing values last, whatever the direction.
fn nulls_last<V: Ord>(a: &Option<V>, b: &Option<V>, ascending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(b), ascending),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Ord for ContinuationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let ord = match (self, other) {
            (
                ContinuationKey::ChronoId { timestamp_ms: ta, id: ia, ascending },
                ContinuationKey::ChronoId { timestamp_ms: tb, id: ib, .. },
            ) => {
                let ta = ta.unwrap_or(MISSING_TIMESTAMP);
                let tb = tb.unwrap_or(MISSING_TIMESTAMP);
                directed(ta.cmp(&tb).then_with(|| ia.cmp(ib)), *ascending)
            }
            (
                ContinuationKey::UsdPriceId {
                    currency_id: ca,
                    native_price: na,
                    usd_price: ua,
                    id: ia,
                    ascending,
                },
                ContinuationKey::UsdPriceId {
                    currency_id: cb,
                    native_price: nb,
                    usd_price: ub,
                    id: ib,
                    ..
                },
            ) => nulls_last(ua, ub, *ascending)
                // same-currency entries stay grouped when USD is unavailable
                .then_with(|| nulls_last(ca, cb, true))
                .then_with(|| directed(na.cmp(nb), *ascending))
                .then_with(|| directed(ia.cmp(ib), *ascending)),
            (ContinuationKey::IdOnly { id: ia }, ContinuationKey::IdOnly { id: ib }) => ia.cmp(ib),
            _ => self.rank().cmp(&other.rank()),
        };

        ord.then_with(|| self.ascending().cmp(&other.ascending()))
    }
}

impl PartialOrd for ContinuationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ContinuationKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ContinuationKey {}

impl fmt::Display for ContinuationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
