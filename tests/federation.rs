//! End-to-end tests of the fan-out orchestrator over in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_federation::continuation::ContinuationFactory;
use market_federation::{
    CursorError, FederationError, Federator, MarketOrder, MemorySource, PageSource, SortOrder, SourcePage,
    Stats, COMPLETED,
};

fn order(chain: &str, id: &str, t: Option<i64>, native: Decimal, usd: Option<Decimal>) -> MarketOrder {
    MarketOrder {
        id: id.to_string(),
        chain: chain.to_string(),
        created_at: t.map(|ms| Utc.timestamp_millis_opt(ms).unwrap()),
        currency_id: chain.to_uppercase(),
        native_price: native,
        usd_price: usd,
    }
}

fn timed(chain: &str, id: &str, t: i64) -> MarketOrder {
    order(chain, id, Some(t), dec!(1), Some(dec!(1)))
}

/// Counts backend calls and can delay or fail them.
struct TestSource {
    inner: MemorySource<MarketOrder>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl TestSource {
    fn new(orders: Vec<MarketOrder>, key: &Arc<dyn ContinuationFactory<MarketOrder>>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySource::new(orders, key.clone()),
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
        })
    }

    fn delayed(orders: Vec<MarketOrder>, key: &Arc<dyn ContinuationFactory<MarketOrder>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySource::new(orders, key.clone()),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
            fail: false,
        })
    }

    /// Answers every position with an empty page before the real one.
    fn with_empty_pages(orders: Vec<MarketOrder>, key: &Arc<dyn ContinuationFactory<MarketOrder>>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySource::new(orders, key.clone()).with_empty_rounds(),
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySource::new(vec![], SortOrder::Id.factory()),
            calls: AtomicUsize::new(0),
            delay: None,
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource<MarketOrder> for TestSource {
    async fn query(&self, cursor: Option<&str>, size: usize) -> anyhow::Result<SourcePage<MarketOrder>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            anyhow::bail!("backend returned 503");
        }
        self.inner.query(cursor, size).await
    }
}

fn federator(sources: &[(&str, Arc<TestSource>)]) -> Federator<MarketOrder> {
    sources.iter().fold(Federator::new(Stats::new(0)), |f, (id, s)| {
        let s: Arc<dyn PageSource<MarketOrder>> = s.clone();
        f.with_source(*id, s)
    })
}

async fn walk(
    fed: &Federator<MarketOrder>,
    size: usize,
    key: &Arc<dyn ContinuationFactory<MarketOrder>>,
) -> Vec<MarketOrder> {
    let mut out = vec![];
    let mut cursor: Option<String> = None;
    for _ in 0..1_000 {
        let page = fed.fetch_page(cursor.as_deref(), size, key.as_ref(), key.as_ref()).await.unwrap();
        assert!(page.entities.len() <= size);
        out.extend(page.entities);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return out,
        }
    }
    panic!("walk did not terminate");
}

#[tokio::test]
async fn interleaves_two_sources_descending() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10), timed("a", "2", 8)], &key);
    let b = TestSource::new(vec![timed("b", "3", 9)], &key);
    let fed = federator(&[("A", a), ("B", b)]);

    let page = fed.fetch_page(None, 2, key.as_ref(), key.as_ref()).await.unwrap();

    let ids: Vec<&str> = page.entities.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(page.cursor.get("A"), Some("8_2"));
    assert_eq!(page.cursor.get("B"), Some(COMPLETED));
    assert_eq!(page.next_cursor.as_deref(), Some("A:8_2;B:COMPLETED"));
}

#[tokio::test]
async fn completed_sources_are_never_queried_again() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10), timed("a", "2", 8)], &key);
    let fed = federator(&[("A", a.clone())]);

    let first = fed.fetch_page(None, 5, key.as_ref(), key.as_ref()).await.unwrap();
    assert_eq!(first.entities.len(), 2);
    assert!(first.cursor.is_completed("A"));
    assert_eq!(first.next_cursor, None);
    assert_eq!(a.calls(), 1);

    let again = fed
        .fetch_page(Some("A:COMPLETED"), 5, key.as_ref(), key.as_ref())
        .await
        .unwrap();
    assert!(again.entities.is_empty());
    assert_eq!(again.next_cursor, None);
    assert_eq!(a.calls(), 1);
    assert_eq!(fed.stats().snapshot(0).sources_skipped, 1);
}

#[tokio::test]
async fn malformed_cursor_is_rejected_before_any_call() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10)], &key);
    let b = TestSource::new(vec![timed("b", "2", 9)], &key);
    let fed = federator(&[("A", a.clone()), ("B", b.clone())]);

    let err = fed
        .fetch_page(Some("A:1;B"), 5, key.as_ref(), key.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, FederationError::MalformedCursor(_)));
    assert!(err.to_string().starts_with("invalid continuation"));
    assert_eq!(a.calls() + b.calls(), 0);
}

#[tokio::test]
async fn priced_orders_come_before_unpriced_ones() {
    let key = SortOrder::PriceAsc.factory::<MarketOrder>();
    let x = order("eth", "x", None, dec!(1000), Some(dec!(5)));
    let y = order("sol", "y", None, dec!(0.0001), None);
    let a = TestSource::new(vec![x], &key);
    let b = TestSource::new(vec![y], &key);
    let fed = federator(&[("eth", a), ("sol", b)]);

    let page = fed.fetch_page(None, 10, key.as_ref(), key.as_ref()).await.unwrap();
    let ids: Vec<&str> = page.entities.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["x", "y"]);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn any_source_failure_fails_the_request() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let ok = TestSource::new(vec![timed("a", "1", 10)], &key);
    let fed = federator(&[("A", ok), ("B", TestSource::failing())]);

    let err = fed.fetch_page(None, 5, key.as_ref(), key.as_ref()).await.unwrap_err();
    match err {
        FederationError::SourceUnavailable { source_id, .. } => assert_eq!(source_id, "B"),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(fed.stats().snapshot(0).source_failures, 1);
    assert_eq!(fed.stats().snapshot(0).pages_served, 0);
}

#[tokio::test]
async fn slow_source_times_out() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let slow = TestSource::delayed(vec![timed("a", "1", 10)], &key, Duration::from_secs(5));
    let fed = federator(&[("A", slow)]).with_request_timeout(Some(Duration::from_millis(20)));

    let err = fed.fetch_page(None, 5, key.as_ref(), key.as_ref()).await.unwrap_err();
    assert!(matches!(err, FederationError::SourceUnavailable { .. }));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn stale_source_in_cursor_is_skipped() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10)], &key);
    let fed = federator(&[("A", a.clone())]);

    let page = fed
        .fetch_page(Some("retired:99_z"), 5, key.as_ref(), key.as_ref())
        .await
        .unwrap();
    assert_eq!(page.entities.len(), 1);
    assert!(page.cursor.is_completed("retired"));
    assert_eq!(page.next_cursor, None);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let key = SortOrder::Id.factory::<MarketOrder>();
    let fed = federator(&[("A", TestSource::new(vec![], &key))]);
    let err = fed.fetch_page(None, 0, key.as_ref(), key.as_ref()).await.unwrap_err();
    assert!(matches!(err, FederationError::InvalidPageSize));
}

#[tokio::test]
async fn approximate_total_sums_reported_totals() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10), timed("a", "2", 8)], &key);
    let b = TestSource::new(vec![timed("b", "3", 9)], &key);
    let fed = federator(&[("A", a), ("B", b)]);

    let page = fed.fetch_page(None, 1, key.as_ref(), key.as_ref()).await.unwrap();
    assert_eq!(page.approximate_total, Some(3));
}

#[tokio::test]
async fn arrival_order_does_not_change_output() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a_orders: Vec<_> = (0..7).map(|i| timed("a", &format!("a{i}"), 100 - i * 3)).collect();
    let b_orders: Vec<_> = (0..5).map(|i| timed("b", &format!("b{i}"), 99 - i * 4)).collect();

    let fast = federator(&[
        ("A", TestSource::new(a_orders.clone(), &key)),
        ("B", TestSource::new(b_orders.clone(), &key)),
    ]);
    let skewed = federator(&[
        ("A", TestSource::delayed(a_orders, &key, Duration::from_millis(15))),
        ("B", TestSource::new(b_orders, &key)),
    ]);

    assert_eq!(walk(&fast, 3, &key).await, walk(&skewed, 3, &key).await);
}

#[tokio::test]
async fn walking_to_the_end_returns_everything_once_in_order() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let eth: Vec<_> = (0..9).map(|i| timed("eth", &format!("e{i}"), 1_000 - i * 7)).collect();
    let sol: Vec<_> = (0..4).map(|i| timed("sol", &format!("s{i}"), 990 - i * 50)).collect();
    let mut polygon: Vec<_> = (0..6).map(|i| timed("polygon", &format!("p{i}"), 1_000 - i * 7)).collect();
    polygon.push(order("polygon", "p-undated", None, dec!(1), None));

    let mut expected: Vec<MarketOrder> = eth.iter().chain(&sol).chain(&polygon).cloned().collect();
    expected.sort_by(|a, b| key.key(a).cmp(&key.key(b)));

    for size in [1, 2, 3, 5, 50] {
        let fed = federator(&[
            ("eth", TestSource::new(eth.clone(), &key)),
            ("sol", TestSource::new(sol.clone(), &key)),
            ("polygon", TestSource::new(polygon.clone(), &key)),
        ]);
        assert_eq!(walk(&fed, size, &key).await, expected, "page size {size}");
    }
}

#[tokio::test]
async fn empty_pages_from_a_source_do_not_stall_the_walk() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let eth: Vec<_> = (0..5).map(|i| timed("eth", &format!("e{i}"), 100 - i * 10)).collect();
    let sol: Vec<_> = (0..5).map(|i| timed("sol", &format!("s{i}"), 95 - i * 10)).collect();

    let mut expected: Vec<MarketOrder> = eth.iter().chain(&sol).cloned().collect();
    expected.sort_by(|a, b| key.key(a).cmp(&key.key(b)));

    for size in [1, 2, 4] {
        let gappy = TestSource::with_empty_pages(sol.clone(), &key);
        let fed = federator(&[("eth", TestSource::new(eth.clone(), &key)), ("sol", gappy.clone())]);
        assert_eq!(walk(&fed, size, &key).await, expected, "page size {size}");
        assert!(gappy.calls() > 1);
    }
}

#[tokio::test]
async fn first_page_after_an_empty_answer_moves_the_cursor() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::with_empty_pages(vec![timed("a", "1", 10)], &key);
    let fed = federator(&[("A", a.clone())]);

    let first = fed.fetch_page(None, 5, key.as_ref(), key.as_ref()).await.unwrap();
    assert!(first.entities.is_empty());
    let next = first.next_cursor.expect("source still has data");
    assert_eq!(first.cursor.get("A"), Some("gap:"));

    let second = fed.fetch_page(Some(&next), 5, key.as_ref(), key.as_ref()).await.unwrap();
    assert_eq!(second.entities, vec![timed("a", "1", 10)]);
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn sub_cursor_rejected_by_its_source_is_a_malformed_cursor() {
    let key = SortOrder::CreatedDesc.factory::<MarketOrder>();
    let a = TestSource::new(vec![timed("a", "1", 10)], &key);
    let fed = federator(&[("A", a.clone())]);

    let err = fed
        .fetch_page(Some("A:bogus"), 5, key.as_ref(), key.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, FederationError::MalformedCursor(CursorError::BadKey { .. })));
    assert!(err.to_string().starts_with("invalid continuation"));
    assert_eq!(a.calls(), 1);
    assert_eq!(fed.stats().snapshot(0).source_failures, 0);
}
