use serde::Deserialize;

use crate::types::SortOrder;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Comma-separated `id=url` pairs, one per chain backend.
    pub sources: String,
    #[serde(default = "default_source_path")]
    pub source_path: String,

    pub page_size: usize,
    pub max_page_size: usize,

    pub source_concurrency: usize,
    // 0 disables the per-source timeout
    pub request_timeout_ms: u64,

    pub sort: String,
    pub start_cursor: Option<String>,
    pub max_pages: usize,
    pub page_delay_ms: u64,

    // Stats
    pub stats_log_sec: u64,
    pub pages_jsonl_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDef {
    pub id: String,
    pub url: String,
}

fn default_source_path() -> String {
    "orders".to_string()
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let c = config::Config::builder()
            .set_default("page_size", 20)?
            .set_default("max_page_size", 100)?
            .set_default("source_concurrency", 8)?
            .set_default("request_timeout_ms", 10_000)?
            .set_default("sort", "created_desc")?
            .set_default("max_pages", 10)?
            .set_default("page_delay_ms", 0)?
            .set_default("stats_log_sec", 30)?
            .add_source(config::Environment::default())
            .build()?;
        Ok(c.try_deserialize()?)
    }

    pub fn source_defs(&self) -> anyhow::Result<Vec<SourceDef>> {
        let mut out: Vec<SourceDef> = vec![];
        for part in self.sources.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, url) = part
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("source entry {part:?} is not id=url"))?;
            let (id, url) = (id.trim(), url.trim());
            if id.is_empty() || id.contains([':', ';']) {
                anyhow::bail!("source id {id:?} must be non-empty and free of ':' and ';'");
            }
            if out.iter().any(|d| d.id == id) {
                anyhow::bail!("source id {id:?} listed twice");
            }
            out.push(SourceDef { id: id.to_string(), url: url.to_string() });
        }
        if out.is_empty() {
            anyhow::bail!("no sources configured");
        }
        Ok(out)
    }

    pub fn sort_order(&self) -> anyhow::Result<SortOrder> {
        self.sort.parse()
    }

    /// Requested page size clamped to `1..=max_page_size`.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, self.max_page_size.max(1))
    }
}
