/*!
Test Harness pour le rejeu

Démarre un `FakeUserCenter`, fournit une config de rejeu rapide pointée dessus
et un `HttpTransport` réel, puis lance le rejeu sur une timeline en mémoire.
*/

use crate::fake_usercenter::FakeUserCenter;
use crate::memory::{MemorySink, MemoryTimeline};
use anyhow::{Context, Result};
use fakeuser_kernel::config::ReplayConfig;
use fakeuser_kernel::sink::RecordSink;
use fakeuser_kernel::transport::HttpTransport;
use fakeuser_kernel::ReplaySummary;
use std::sync::Arc;

pub struct TestHarness {
    pub usercenter: FakeUserCenter,
    pub config: ReplayConfig,
    pub sink: MemorySink,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let usercenter = FakeUserCenter::start().await?;
        let mut config = ReplayConfig::default();
        config.usercenter = usercenter.usercenter_conf();
        // 1 ms par minute simulée
        config.acceleration_ratio = 60_000;
        config.network.timeout_ms = 2_000;
        config.network.retry_delay_ms = 10;
        config.network.max_in_flight = 32;
        config.record.enabled = true;

        Ok(Self { usercenter, config, sink: MemorySink::new() })
    }

    pub fn transport(&self) -> Result<Arc<HttpTransport>> {
        let transport = HttpTransport::new(self.config.usercenter.clone(), self.config.network.timeout())
            .context("failed to build http transport")?;
        Ok(Arc::new(transport))
    }

    /// Replays `timeline` end to end, recording into `self.sink`.
    pub async fn replay(&self, timeline: &MemoryTimeline) -> Result<ReplaySummary> {
        let summary = fakeuser_kernel::run(
            &self.config,
            self.transport()?,
            timeline,
            Some(&self.sink as &dyn RecordSink),
        )
        .await?;
        log::info!(
            "replayed {} ticks, halted: {:?}, hits: {:?}",
            summary.ticks,
            summary.halted,
            self.usercenter.hits()
        );
        Ok(summary)
    }
}
