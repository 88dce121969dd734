use crate::error::TimelineError;
use crate::models::{SimTime, SiteTargets};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only access to the replayed history.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    async fn first_date(&self) -> Result<SimTime, TimelineError>;

    async fn last_date(&self) -> Result<SimTime, TimelineError>;

    /// Target online count per site at `at`. Fails if the history has no row for it.
    async fn counts_at(&self, at: SimTime) -> Result<SiteTargets, TimelineError>;
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    date: String,
    site_id: String,
    instances: u64,
}

/// History loaded from a JSON array of `{date, site_id, instances}` rows.
#[derive(Debug, Clone, Default)]
pub struct JsonTimeline {
    rows: BTreeMap<SimTime, BTreeMap<String, u64>>,
    scale_ratio: u32,
}

impl JsonTimeline {
    pub async fn load(path: &Path, scale_ratio: u32) -> Result<Self, TimelineError> {
        let txt = tokio::fs::read_to_string(path).await?;
        let timeline = Self::from_json(&txt, scale_ratio)?;
        tracing::info!(
            path = %path.display(),
            minutes = timeline.rows.len(),
            "history loaded"
        );
        Ok(timeline)
    }

    pub fn from_json(txt: &str, scale_ratio: u32) -> Result<Self, TimelineError> {
        let raw: Vec<HistoryRow> = serde_json::from_str(txt)?;
        let mut rows: BTreeMap<SimTime, BTreeMap<String, u64>> = BTreeMap::new();
        for row in raw {
            let at: SimTime = row
                .date
                .parse()
                .map_err(|_| TimelineError::InvalidDate(row.date.clone()))?;
            *rows.entry(at).or_default().entry(row.site_id).or_default() += row.instances;
        }
        Ok(Self { rows, scale_ratio: scale_ratio.max(1) })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl TimelineSource for JsonTimeline {
    async fn first_date(&self) -> Result<SimTime, TimelineError> {
        self.rows.keys().next().copied().ok_or(TimelineError::Empty)
    }

    async fn last_date(&self) -> Result<SimTime, TimelineError> {
        self.rows.keys().next_back().copied().ok_or(TimelineError::Empty)
    }

    async fn counts_at(&self, at: SimTime) -> Result<SiteTargets, TimelineError> {
        let sites = self.rows.get(&at).ok_or(TimelineError::MissingRows(at))?;
        let scale = u64::from(self.scale_ratio);
        Ok(sites
            .iter()
            .map(|(site, instances)| (site.clone(), (instances / scale) as usize))
            .collect())
    }
}
