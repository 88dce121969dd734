/*!
Historique et enregistrements en mémoire

`MemoryTimeline` remplace le fichier d'historique, `MemorySink` capture les
lignes que le rejeu aurait persistées.
*/

use anyhow::Result;
use async_trait::async_trait;
use fakeuser_kernel::error::{SinkError, TimelineError};
use fakeuser_kernel::sink::RecordSink;
use fakeuser_kernel::timeline::TimelineSource;
use fakeuser_kernel::{ReconciliationOutcome, SimTime, SiteTargets};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryTimeline {
    minutes: BTreeMap<SimTime, SiteTargets>,
}

impl MemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the targets for one minute, e.g. `"2021-01-01 00:00"`.
    pub fn minute(mut self, at: &str, sites: &[(&str, usize)]) -> Result<Self> {
        let at: SimTime = at.parse()?;
        let targets = sites.iter().map(|(s, n)| (s.to_string(), *n)).collect();
        self.minutes.insert(at, targets);
        Ok(self)
    }

    /// One site following `counts`, one minute per entry from `start`.
    pub fn curve(start: &str, site_id: &str, counts: &[usize]) -> Result<Self> {
        let mut at: SimTime = start.parse()?;
        let mut timeline = Self::new();
        for (i, &n) in counts.iter().enumerate() {
            if i > 0 {
                at = at
                    .next_minute()
                    .ok_or_else(|| anyhow::anyhow!("curve runs past the calendar"))?;
            }
            timeline.minutes.insert(at, SiteTargets::from([(site_id.to_string(), n)]));
        }
        Ok(timeline)
    }

    /// Drops a minute so that the replay hits a hole.
    pub fn without(mut self, at: &str) -> Result<Self> {
        self.minutes.remove(&at.parse::<SimTime>()?);
        Ok(self)
    }
}

#[async_trait]
impl TimelineSource for MemoryTimeline {
    async fn first_date(&self) -> Result<SimTime, TimelineError> {
        self.minutes.keys().next().copied().ok_or(TimelineError::Empty)
    }

    async fn last_date(&self) -> Result<SimTime, TimelineError> {
        self.minutes.keys().next_back().copied().ok_or(TimelineError::Empty)
    }

    async fn counts_at(&self, at: SimTime) -> Result<SiteTargets, TimelineError> {
        self.minutes.get(&at).cloned().ok_or(TimelineError::MissingRows(at))
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, ReconciliationOutcome)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ReconciliationOutcome> {
        self.records.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Realized counts of one site, in tick order.
    pub fn series(&self, site_id: &str) -> Vec<usize> {
        self.records
            .lock()
            .iter()
            .filter(|(_, r)| r.site_id == site_id)
            .map(|(_, r)| r.instances)
            .collect()
    }

    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self.records.lock().iter().map(|(z, _)| z.clone()).collect();
        zones.dedup();
        zones
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn record(&self, zone_id: &str, records: &[ReconciliationOutcome]) -> Result<(), SinkError> {
        let mut stored = self.records.lock();
        stored.extend(records.iter().map(|r| (zone_id.to_string(), r.clone())));
        Ok(())
    }
}
