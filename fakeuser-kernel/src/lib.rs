/*!
# Fakeuser Kernel - Rejeu de charge pour UserCenter

Rejoue la courbe historique "devices en ligne par site" d'une zone contre un
UserCenter, une minute simulée par tick.

Le binaire câble `ReplayConfig` à un `HttpTransport`, une `JsonTimeline` et un
`JsonlRecordSink` ; tout ce qui est derrière ces traits s'utilise seul.
*/

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod registry;
pub mod replay;
pub mod sink;
pub mod stats;
pub mod timeline;
pub mod transport;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::ReplayConfig;
pub use error::{NetError, ReplayError};
pub use models::{Device, Instance, ReconciliationOutcome, SimTime, SiteTargets};
pub use replay::{run, ReplaySummary};
