/**
 * REPLAY LOOP - Boucle temporelle du rejeu
 *
 * RÔLE :
 * Transforme un ticker temps réel (60000 / ratio ms) en minutes simulées
 * successives, du début configuré (ou premier disponible) au dernier disponible inclus.
 *
 * FONCTIONNEMENT :
 * - Chaque tick est réconcilié entièrement avant de repoller le ticker
 * - Tirs manqués pendant un tick lent : sautés, jamais rejoués
 * - Ligne d'historique absente : arrêt de la boucle, raison dans `ReplaySummary::halted`
 * - Échec du sink : loggé et compté, la boucle continue
 */

use crate::client::{NetworkClient, RetryPolicy};
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::models::SimTime;
use crate::reconciler::Reconciler;
use crate::registry::DeviceRegistry;
use crate::sink::RecordSink;
use crate::stats::{ReplayStats, StatsSnapshot};
use crate::timeline::TimelineSource;
use crate::transport::SessionTransport;
use crate::workflow::Fleet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Successive simulated minutes from `start` to `end`, inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayClock {
    start: SimTime,
    end: SimTime,
    prev: Option<SimTime>,
}

impl ReplayClock {
    pub fn new(start: SimTime, end: SimTime) -> Result<Self, ReplayError> {
        if start > end {
            return Err(ReplayError::InvalidRange { start, end });
        }
        Ok(Self { start, end, prev: None })
    }

    pub fn start(&self) -> SimTime {
        self.start
    }

    pub fn end(&self) -> SimTime {
        self.end
    }

    /// The minute for the next tick, or `None` once `end` has been handed out.
    pub fn advance(&mut self) -> Option<SimTime> {
        let next = match self.prev {
            None => self.start,
            Some(prev) if prev >= self.end => return None,
            Some(prev) => prev.next_minute()?,
        };
        self.prev = Some(next);
        Some(next)
    }
}

/// Start comes from configuration when given, else from the timeline; end always from the timeline.
pub async fn resolve_bounds(
    start_time: Option<SimTime>,
    timeline: &dyn TimelineSource,
) -> Result<ReplayClock, ReplayError> {
    let start = match start_time {
        Some(start) => start,
        None => timeline
            .first_date()
            .await
            .map_err(|source| ReplayError::Boundary { which: "start", source })?,
    };
    let end = timeline
        .last_date()
        .await
        .map_err(|source| ReplayError::Boundary { which: "end", source })?;
    ReplayClock::new(start, end)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub first: SimTime,
    pub last: Option<SimTime>,
    /// Why the loop stopped before the end boundary, if it did.
    pub halted: Option<String>,
    pub stats: StatsSnapshot,
}

pub struct Replay<'a> {
    pub zone_id: String,
    pub period: Duration,
    pub timeline: &'a dyn TimelineSource,
    /// `None` when recording is disabled.
    pub sink: Option<&'a dyn RecordSink>,
    pub stats: ReplayStats,
}

impl Replay<'_> {
    pub async fn run(&self, mut clock: ReplayClock, reconciler: &mut Reconciler) -> ReplaySummary {
        info!(
            zone = %self.zone_id,
            start = %clock.start(),
            end = %clock.end(),
            period_ms = self.period.as_millis() as u64,
            "starting replay"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let first = clock.start();
        let mut ticks = 0;
        let mut last = None;
        let mut halted = None;

        while let Some(at) = clock.advance() {
            ticker.tick().await;
            info!(%at, "----------------------------------");

            let targets = match self.timeline.counts_at(at).await {
                Ok(targets) => targets,
                Err(e) => {
                    error!(%at, error = %e, "failed to get history, stopping replay");
                    halted = Some(format!("{at}: {e}"));
                    break;
                }
            };

            let tick = reconciler.reconcile(at, &targets).await;
            if let Some(sink) = self.sink {
                if let Err(e) = sink.record(&self.zone_id, &tick.outcomes).await {
                    warn!(%at, error = %e, "failed to insert records");
                    self.stats.record_sink_failure();
                }
            }

            ticks += 1;
            last = Some(at);
        }

        let stats = self.stats.snapshot();
        match serde_json::to_string(&stats) {
            Ok(json) => info!(ticks, stats = %json, "replay finished"),
            Err(_) => info!(ticks, "replay finished"),
        }
        ReplaySummary { ticks, first, last, halted, stats }
    }
}

/// Wires a fresh registry and fleet over `transport` and replays the whole range.
pub async fn run(
    config: &ReplayConfig,
    transport: Arc<dyn SessionTransport>,
    timeline: &dyn TimelineSource,
    sink: Option<&dyn RecordSink>,
) -> Result<ReplaySummary, ReplayError> {
    let clock = resolve_bounds(config.start_time, timeline).await?;

    let client = NetworkClient::new(transport, RetryPolicy::from(&config.network));
    let fleet = Fleet::new(
        &config.zone_id,
        Arc::new(DeviceRegistry::new()),
        client,
        config.network.max_in_flight,
    );
    let stats = ReplayStats::new();
    let mut reconciler = Reconciler::new(fleet, stats.clone());

    let replay = Replay {
        zone_id: config.zone_id.clone(),
        period: config.tick_period(),
        timeline,
        sink: if config.record.enabled { sink } else { None },
        stats,
    };
    Ok(replay.run(clock, &mut reconciler).await)
}
