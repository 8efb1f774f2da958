//! Configured trend terms as a source. No network access.

use async_trait::async_trait;
use errorpress_shared::{Result, Source, TrendsSourceConfig};

use super::cap;
use crate::{QueryParams, RawRecord, SignalSource};

pub struct TrendsSource {
    config: TrendsSourceConfig,
}

impl TrendsSource {
    pub fn new(config: TrendsSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SignalSource for TrendsSource {
    fn source(&self) -> Source {
        Source::Trends
    }

    async fn fetch_candidates(&self, params: &QueryParams) -> Result<Vec<RawRecord>> {
        let records = self
            .config
            .terms
            .iter()
            .map(|t| {
                let mut fields = serde_json::Map::new();
                if let Some(v) = t.search_volume {
                    fields.insert("search_volume".into(), v.into());
                }
                if let Some(v) = t.trend_score {
                    fields.insert("trend_score".into(), v.into());
                }
                RawRecord {
                    source: Source::Trends,
                    text: t.term.clone(),
                    url: None,
                    fields,
                }
            })
            .collect();
        Ok(cap(records, params.limit))
    }
}
