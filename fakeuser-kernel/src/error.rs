/**
 * ERREURS - Taxonomie par couche
 *
 * NetError reste au niveau device (comptée par la flotte), TimelineError
 * arrête la boucle, ReplayError interrompt le démarrage.
 */

use crate::models::SimTime;

/// Failure of one call to the UserCenter or to an instance.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("usercenter rejected the request with status code {status_code}: {message}")]
    Envelope { status_code: i64, message: String },
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("login response carries no instance")]
    MissingInstance,
    #[error("{op} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        op: &'static str,
        attempts: u32,
        last: Box<NetError>,
    },
}

impl NetError {
    /// Transport-level failures are the only ones worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, NetError::Transport(_) | NetError::Status { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid date '{0}' in history")]
    InvalidDate(String),
    #[error("history is empty")]
    Empty,
    #[error("no history rows at {0}")]
    MissingRows(SimTime),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Conditions that abort the process before the first tick.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot resolve {which} boundary: {source}")]
    Boundary {
        which: &'static str,
        #[source]
        source: TimelineError,
    },
    #[error("start {start} is after end {end}")]
    InvalidRange { start: SimTime, end: SimTime },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] NetError),
}
