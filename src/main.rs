use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use market_federation::config::Settings;
use market_federation::source::{HttpPageSource, PageSource};
use market_federation::{Federator, MarketOrder, Stats};

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Append `record` as one JSON line. A record that does not serialize is skipped.
async fn maybe_write_jsonl<R: Serialize>(path: &Option<String>, record: &R) {
    let Some(p) = path.as_ref().map(|x| x.trim().to_string()).filter(|x| !x.is_empty()) else {
        return;
    };
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(path = %p, error = %e, "jsonl record not serializable, skipping");
            return;
        }
    };
    if let Ok(mut f) = tokio::fs::OpenOptions::new().create(true).append(true).open(&p).await {
        use tokio::io::AsyncWriteExt;
        let _ = f.write_all(line.as_bytes()).await;
        let _ = f.write_all(b"\n").await;
    }
}

#[derive(Debug, Serialize)]
struct PageSummary<'a> {
    request_id: String,
    page: usize,
    entities: usize,
    first_id: Option<&'a str>,
    last_id: Option<&'a str>,
    approximate_total: Option<u64>,
    next_cursor: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let s = Settings::from_env()?;
    let sort = s.sort_order()?;
    let size = s.effective_page_size();
    let stats = Stats::new(now_ms());

    let http = reqwest::Client::builder().build()?;

    let mut federator: Federator<MarketOrder> = Federator::new(stats.clone())
        .with_concurrency(s.source_concurrency)
        .with_request_timeout((s.request_timeout_ms > 0).then(|| Duration::from_millis(s.request_timeout_ms)));
    for def in s.source_defs()? {
        let source: Arc<dyn PageSource<MarketOrder>> =
            Arc::new(HttpPageSource::new(&def.url, &s.source_path, http.clone()));
        tracing::info!(source_id = %def.id, url = %def.url, "source enabled");
        federator = federator.with_source(def.id, source);
    }

    let key = sort.factory::<MarketOrder>();
    let mut cursor = s.start_cursor.clone().filter(|c| !c.trim().is_empty());

    tracing::info!(?sort, size, max_pages = s.max_pages, "walking federated listing");

    for n in 0..s.max_pages {
        let page = federator
            .fetch_page(cursor.as_deref(), size, key.as_ref(), key.as_ref())
            .await?;

        let summary = PageSummary {
            request_id: page.request_id.to_string(),
            page: n,
            entities: page.entities.len(),
            first_id: page.entities.first().map(|o| o.id.as_str()),
            last_id: page.entities.last().map(|o| o.id.as_str()),
            approximate_total: page.approximate_total,
            next_cursor: page.next_cursor.as_deref(),
        };
        tracing::info!(
            page = n,
            entities = summary.entities,
            approximate_total = ?summary.approximate_total,
            next_cursor = ?summary.next_cursor,
            "page"
        );
        for o in &page.entities {
            tracing::debug!(
                chain = %o.chain,
                id = %o.id,
                created_at = ?o.created_at,
                native_price = %o.native_price,
                currency = %o.currency_id,
                usd_price = ?o.usd_price,
                "order"
            );
        }

        maybe_write_jsonl(&s.pages_jsonl_path, &summary).await;

        // stats summary
        let t = now_ms();
        if stats.should_log(t, s.stats_log_sec) {
            let ss = stats.snapshot(t);
            stats.mark_logged(t);
            tracing::info!(
                up_sec = ss.up_sec,
                pages_served = ss.pages_served,
                entities_emitted = ss.entities_emitted,
                source_queries = ss.source_queries,
                sources_skipped = ss.sources_skipped,
                source_failures = ss.source_failures,
                "stats"
            );
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                tracing::info!(pages = n + 1, "all sources completed");
                break;
            }
        }

        if s.page_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(s.page_delay_ms)).await;
        }
    }

    match serde_json::to_string(&stats.snapshot(now_ms())) {
        Ok(line) => tracing::info!(stats = %line, "done"),
        Err(e) => tracing::warn!(error = %e, "done; stats not serializable"),
    }
    Ok(())
}
