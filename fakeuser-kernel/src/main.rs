/**
 * FAKEUSER - Point d'entrée du rejeu de charge
 *
 * RÔLE : Charge la config (YAML + env), l'historique de la zone, puis rejoue
 * minute par minute les connexions/déconnexions de devices contre le UserCenter.
 *
 * ARCHITECTURE : config → transport HTTP → timeline JSON → boucle de rejeu → records JSONL.
 * SORTIE : code 0 une fois la plage rejouée (ou interrompue par un trou d'historique),
 * code non nul sur erreur de config ou de bornes.
 */

use anyhow::Context;
use fakeuser_kernel::config::ReplayConfig;
use fakeuser_kernel::sink::{JsonlRecordSink, RecordSink};
use fakeuser_kernel::timeline::JsonTimeline;
use fakeuser_kernel::transport::HttpTransport;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fakeuser_kernel=info,fakeuser=info")),
        )
        .init();

    let config = ReplayConfig::load().await.context("invalid configuration")?;
    tracing::info!(
        zone = %config.zone_id,
        usercenter = %config.usercenter.endpoint(""),
        acceleration = config.acceleration_ratio,
        scale = config.scale_ratio,
        recording = config.record.enabled,
        "fakeuser starting"
    );

    let history = config.history_path();
    let timeline = JsonTimeline::load(&history, config.scale_ratio)
        .await
        .with_context(|| format!("failed to load history from {}", history.display()))?;

    let transport = HttpTransport::new(config.usercenter.clone(), config.network.timeout())
        .context("failed to build http client")?;

    let sink = JsonlRecordSink::new(config.record.dir.clone());
    let summary = fakeuser_kernel::run(
        &config,
        Arc::new(transport),
        &timeline,
        Some(&sink as &dyn RecordSink),
    )
    .await?;

    match &summary.halted {
        Some(reason) => tracing::warn!(ticks = summary.ticks, %reason, "replay halted early"),
        None => tracing::info!(
            ticks = summary.ticks,
            first = %summary.first,
            last = ?summary.last.map(|m| m.to_string()),
            "replay complete"
        ),
    }
    Ok(())
}
