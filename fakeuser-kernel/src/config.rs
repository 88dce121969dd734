/**
 * CONFIGURATION - Paramètres du rejeu
 *
 * RÔLE :
 * Base YAML optionnelle (`$FAKEUSER_CONFIG`, défaut `fakeuser.yaml`) puis
 * surcharge par variables d'environnement (noms des manifestes de déploiement).
 * Validation avant tout tick.
 */

use crate::error::ConfigError;
use crate::models::SimTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    pub zone_id: String,
    /// Simulated minutes replayed per real minute. 0 means unset.
    pub acceleration_ratio: u32,
    /// Divisor applied to historical counts.
    pub scale_ratio: u32,
    pub start_time: Option<SimTime>,
    pub usercenter: UserCenterConf,
    pub network: NetworkConf,
    pub record: RecordConf,
    pub history_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UserCenterConf {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub login_path: String,
    pub logout_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConf {
    pub timeout_ms: u64,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_in_flight: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RecordConf {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            zone_id: "huadong".into(),
            acceleration_ratio: 0,
            scale_ratio: 1,
            start_time: None,
            usercenter: UserCenterConf::default(),
            network: NetworkConf::default(),
            record: RecordConf::default(),
            history_file: None,
        }
    }
}

impl Default for UserCenterConf {
    fn default() -> Self {
        Self {
            protocol: "http".into(),
            host: String::new(),
            port: 0,
            login_path: "device/login".into(),
            logout_path: "device/logout".into(),
        }
    }
}

impl Default for NetworkConf {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            connect_attempts: 2,
            retry_delay_ms: 1000,
            max_in_flight: 256,
        }
    }
}

impl Default for RecordConf {
    fn default() -> Self {
        Self { enabled: true, dir: PathBuf::from("data") }
    }
}

impl UserCenterConf {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol,
            self.host,
            self.port,
            path.trim_start_matches('/')
        )
    }

    pub fn login_url(&self) -> String {
        self.endpoint(&self.login_path)
    }

    pub fn logout_url(&self) -> String {
        self.endpoint(&self.logout_path)
    }
}

impl NetworkConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ReplayConfig {
    /// Loads the YAML base (if any), overlays the process environment and validates.
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FAKEUSER_CONFIG").unwrap_or_else(|_| "fakeuser.yaml".into());
        let base = Self::from_yaml_file(Path::new(&path)).await?;
        base.apply_env(|var| std::env::var(var).ok())?.validated()
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let txt = fs::read_to_string(path).await?;
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&txt)?)
    }

    /// Overrides fields with the variables `lookup` knows about.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(zone) = get("ZONE_ID") {
            self.zone_id = zone;
        }
        if let Some(v) = get("ACCELERATION_RATIO") {
            self.acceleration_ratio = parse_positive("ACCELERATION_RATIO", &v)?;
        }
        if let Some(v) = get("SCALE_RATIO") {
            self.scale_ratio = parse_positive("SCALE_RATIO", &v)?;
        }
        if let Some(v) = get("START_TIME") {
            self.start_time = Some(parse_var("START_TIME", &v)?);
        }
        if let Some(v) = get("USERCENTER_PROTOCOL") {
            self.usercenter.protocol = v;
        }
        if let Some(v) = get("USERCENTER_SERVICE_SERVICE_HOST") {
            self.usercenter.host = v;
        }
        if let Some(v) = get("USERCENTER_SERVICE_SERVICE_PORT") {
            self.usercenter.port = parse_var("USERCENTER_SERVICE_SERVICE_PORT", &v)?;
        }
        if let Some(v) = get("LOGIN_PATH") {
            self.usercenter.login_path = v;
        }
        if let Some(v) = get("LOGOUT_PATH") {
            self.usercenter.logout_path = v;
        }
        // the UserCenter has its own recorder; we record only when it doesn't
        if let Some(v) = get("USERCENTER_RECORD_ENABLED") {
            self.record.enabled = v.trim().eq_ignore_ascii_case("false");
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            self.network.timeout_ms = parse_var("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CONNECT_ATTEMPTS") {
            self.network.connect_attempts = parse_positive("CONNECT_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_DELAY_MS") {
            self.network.retry_delay_ms = parse_var("RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAX_IN_FLIGHT") {
            let n: u32 = parse_positive("MAX_IN_FLIGHT", &v)?;
            self.network.max_in_flight = n as usize;
        }
        if let Some(v) = get("HISTORY_FILE") {
            self.history_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RECORD_DIR") {
            self.record.dir = PathBuf::from(v);
        }
        Ok(self)
    }

    /// Checks the fields nothing can default.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.acceleration_ratio == 0 {
            return Err(ConfigError::Missing("ACCELERATION_RATIO"));
        }
        if self.scale_ratio == 0 {
            return Err(ConfigError::Invalid {
                var: "SCALE_RATIO",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        if self.usercenter.host.trim().is_empty() {
            return Err(ConfigError::Missing("USERCENTER_SERVICE_SERVICE_HOST"));
        }
        if self.usercenter.port == 0 {
            return Err(ConfigError::Missing("USERCENTER_SERVICE_SERVICE_PORT"));
        }
        if self.network.connect_attempts == 0 || self.network.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                var: "CONNECT_ATTEMPTS/MAX_IN_FLIGHT",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(self)
    }

    /// Real-time interval between two ticks.
    pub fn tick_period(&self) -> Duration {
        let ratio = u64::from(self.acceleration_ratio.max(1));
        Duration::from_millis((60_000 / ratio).max(1))
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("data/history_{}.json", self.zone_id)))
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    let n: u32 = parse_var(var, value)?;
    if n == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be positive".into(),
        });
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ACCELERATION_RATIO", "60"),
            ("USERCENTER_SERVICE_SERVICE_HOST", "usercenter.svc"),
            ("USERCENTER_SERVICE_SERVICE_PORT", "8080"),
        ]
    }

    #[test]
    fn test_defaults_and_required_vars() {
        let cfg = ReplayConfig::default()
            .apply_env(env(&minimal()))
            .unwrap()
            .validated()
            .unwrap();
        assert_eq!(cfg.zone_id, "huadong");
        assert_eq!(cfg.scale_ratio, 1);
        assert!(cfg.record.enabled);
        assert_eq!(cfg.network.connect_attempts, 2);
        assert_eq!(cfg.network.retry_delay(), Duration::from_secs(1));
        assert_eq!(cfg.tick_period(), Duration::from_secs(1));
        assert_eq!(cfg.usercenter.login_url(), "http://usercenter.svc:8080/device/login");
        assert_eq!(cfg.history_path(), PathBuf::from("data/history_huadong.json"));
    }

    #[test]
    fn test_missing_acceleration_ratio_is_rejected() {
        let err = ReplayConfig::default()
            .apply_env(env(&minimal()[1..]))
            .unwrap()
            .validated()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ACCELERATION_RATIO")));

        let mut vars = minimal();
        vars[0] = ("ACCELERATION_RATIO", "0");
        assert!(ReplayConfig::default().apply_env(env(&vars)).is_err());
    }

    #[test]
    fn test_record_switch_is_inverted() {
        let mut vars = minimal();
        vars.push(("USERCENTER_RECORD_ENABLED", "true"));
        let cfg = ReplayConfig::default().apply_env(env(&vars)).unwrap();
        assert!(!cfg.record.enabled);

        vars.pop();
        vars.push(("USERCENTER_RECORD_ENABLED", "FALSE"));
        let cfg = ReplayConfig::default().apply_env(env(&vars)).unwrap();
        assert!(cfg.record.enabled);
    }

    #[test]
    fn test_start_time_must_parse() {
        let mut vars = minimal();
        vars.push(("START_TIME", "not a date"));
        assert!(ReplayConfig::default().apply_env(env(&vars)).is_err());

        vars.pop();
        vars.push(("START_TIME", "2021-01-01 00:00:00"));
        let cfg = ReplayConfig::default().apply_env(env(&vars)).unwrap();
        assert_eq!(cfg.start_time.unwrap().to_string(), "2021-01-01 00:00:00");
    }

    #[test]
    fn test_tick_period_floor() {
        let cfg = ReplayConfig { acceleration_ratio: 120_000, ..Default::default() };
        assert_eq!(cfg.tick_period(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_yaml_base_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fakeuser.yaml");
        std::fs::write(
            &path,
            "zone_id: huabei\nacceleration_ratio: 10\nusercenter:\n  host: uc.local\n  port: 9000\n",
        )
        .unwrap();

        let cfg = ReplayConfig::from_yaml_file(&path).await.unwrap();
        assert_eq!(cfg.zone_id, "huabei");
        assert_eq!(cfg.usercenter.login_path, "device/login");

        let cfg = cfg
            .apply_env(env(&[("ACCELERATION_RATIO", "30")]))
            .unwrap()
            .validated()
            .unwrap();
        assert_eq!(cfg.acceleration_ratio, 30);
        assert_eq!(cfg.usercenter.port, 9000);

        let missing = ReplayConfig::from_yaml_file(&dir.path().join("absent.yaml")).await.unwrap();
        assert_eq!(missing, ReplayConfig::default());
    }
}
