use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

const FULL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const SHORT_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const RENDER_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:00");

/// Simulated timestamp, minute granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(PrimitiveDateTime);

impl SimTime {
    pub fn new(at: PrimitiveDateTime) -> Self {
        // seconds never survive: the history is sampled per minute
        let minute = time::Time::from_hms(at.hour(), at.minute(), 0).unwrap_or(at.time());
        Self(at.replace_time(minute))
    }

    pub fn next_minute(self) -> Option<Self> {
        self.0.checked_add(time::Duration::minutes(1)).map(Self)
    }

    pub fn as_datetime(&self) -> PrimitiveDateTime {
        self.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(RENDER_FORMAT) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

impl FromStr for SimTime {
    type Err = time::error::Parse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match PrimitiveDateTime::parse(s, FULL_FORMAT) {
            Ok(at) => Ok(Self::new(at)),
            Err(full_err) => PrimitiveDateTime::parse(s, SHORT_FORMAT)
                .map(Self::new)
                .map_err(|_| full_err),
        }
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One synthetic session bound to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub zone_id: String,
    pub site_id: String,
    pub host: String,
    pub port: u16,
}

/// Instance descriptor handed out by the UserCenter on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub site_id: String,
    pub server_ip: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub pod_name: String,
    pub port: u16,
    #[serde(default)]
    pub is_elastic: i32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub device_id: String,
}

/// Response envelope shared by the UserCenter login/logout endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub const SUCCESS: i64 = 200;

    pub fn is_success(&self) -> bool {
        self.status_code == Self::SUCCESS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub instance: Option<Instance>,
}

/// Per-site result of one tick, handed to the record sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub site_id: String,
    pub date: SimTime,
    pub instances: usize,
    pub login_failures: usize,
}

/// Target online count per site for one simulated minute.
pub type SiteTargets = BTreeMap<String, usize>;
