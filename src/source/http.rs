use std::marker::PhantomData;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::{DeserializeOwned, Deserializer};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::CursorError;
use crate::source::{PageSource, SourcePage};

/// JSON backend for one chain's marketplace.
///
/// Issues `GET {host}/{path}?limit={size}[&cursor={cursor}]` and expects
/// `{"data": [...], "next_cursor": "..." | null, "total": n}`.
pub struct HttpPageSource<T> {
    url: String,
    http: reqwest::Client,
    _entity: PhantomData<fn() -> T>,
}

impl<T> HttpPageSource<T> {
    pub fn new(host: &str, path: &str, http: reqwest::Client) -> Self {
        let url = format!(
            "{}/{}",
            host.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Self { url, http, _entity: PhantomData }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> PageSource<T> for HttpPageSource<T> {
    async fn query(&self, cursor: Option<&str>, size: usize) -> Result<SourcePage<T>> {
        let mut req = self.http.get(&self.url).query(&[("limit", size.to_string())]);
        if let Some(c) = cursor {
            req = req.query(&[("cursor", c)]);
        }

        tracing::debug!(url = %self.url, cursor = ?cursor, size, "querying source page");

        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("read {} body failed", self.url))?;
        if !status.is_success() {
            let snippet: String = body.chars().take(512).collect();
            if let Some(err) = rejected_cursor(status, cursor, &snippet) {
                return Err(err.into());
            }
            anyhow::bail!("GET {} non-200: status={} body_snippet={}", self.url, status, snippet);
        }

        let page: PageResp<T> = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                let snippet: String = body.chars().take(2048).collect();
                anyhow::bail!("decode {} json failed: {} body_snippet={}", self.url, e, snippet);
            }
        };

        Ok(SourcePage {
            entities: page.data,
            next_cursor: page.next_cursor.filter(|c| !c.is_empty()),
            total: page.total,
        })
    }
}

/// A 400 on a request that carried a cursor means the backend did not accept it.
fn rejected_cursor(status: StatusCode, cursor: Option<&str>, snippet: &str) -> Option<CursorError> {
    match (status, cursor) {
        (StatusCode::BAD_REQUEST, Some(c)) => Some(CursorError::BadKey {
            token: c.to_string(),
            reason: format!("rejected by backend: {snippet}"),
        }),
        _ => None,
    }
}

fn vec_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct PageResp<T> {
    #[serde(default, deserialize_with = "vec_or_empty")]
    data: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    total: Option<u64>,
}
