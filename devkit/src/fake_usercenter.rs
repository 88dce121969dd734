/*!
Faux UserCenter HTTP pour tests de bout en bout

Un seul serveur axum sur 127.0.0.1:0 répond aux routes du UserCenter
(`POST /device/login`, `POST /device/logout`) et à celles d'une instance
(`POST /connect`, `GET /disconnect`, `GET /healthz`). Les instances renvoyées
au login pointent sur ce même serveur. Des leviers permettent de simuler les
pannes, et des compteurs servent aux assertions.
*/

use anyhow::{Context, Result};
use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use fakeuser_kernel::config::UserCenterConf;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Requests served per route.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Hits {
    pub login: usize,
    pub logout: usize,
    pub connect: usize,
    pub disconnect: usize,
    pub healthz: usize,
}

#[derive(Debug, Default)]
struct Knobs {
    login_http_status: Option<u16>,
    login_envelope_status: Option<i64>,
    null_instance: bool,
    failing_connects: usize,
    unhealthy: bool,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DeviceForm {
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Default)]
struct Inner {
    port: u16,
    hits: Mutex<Hits>,
    knobs: Mutex<Knobs>,
    /// device_id → site_id of every device logged in and not yet logged out
    sessions: Mutex<BTreeMap<String, String>>,
    logouts: Mutex<Vec<DeviceForm>>,
}

type Shared = Arc<Inner>;

pub struct FakeUserCenter {
    addr: SocketAddr,
    inner: Shared,
    server: JoinHandle<()>,
}

impl FakeUserCenter {
    /// Binds an ephemeral loopback port and starts serving.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind fake usercenter")?;
        let addr = listener.local_addr()?;
        let inner: Shared = Arc::new(Inner { port: addr.port(), ..Inner::default() });

        let app = Router::new()
            .route("/device/login", post(login))
            .route("/device/logout", post(logout))
            .route("/connect", post(connect))
            .route("/disconnect", get(disconnect))
            .route("/healthz", get(healthz))
            .with_state(inner.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("fake usercenter stopped: {}", e);
            }
        });
        log::info!("fake usercenter listening on http://{}", addr);
        Ok(Self { addr, inner, server })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection settings pointing the replay at this server.
    pub fn usercenter_conf(&self) -> UserCenterConf {
        UserCenterConf {
            protocol: "http".into(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..UserCenterConf::default()
        }
    }

    pub fn hits(&self) -> Hits {
        *self.inner.hits.lock()
    }

    /// Devices currently holding a session, per site.
    pub fn online(&self, site_id: &str) -> usize {
        self.inner.sessions.lock().values().filter(|s| *s == site_id).count()
    }

    pub fn logouts(&self) -> Vec<DeviceForm> {
        self.inner.logouts.lock().clone()
    }

    /// Answer every login with this HTTP status (`None` restores 200).
    pub fn set_login_http_status(&self, status: Option<u16>) {
        self.inner.knobs.lock().login_http_status = status;
    }

    /// Answer every login with HTTP 200 and this envelope status code.
    pub fn set_login_envelope_status(&self, status_code: Option<i64>) {
        self.inner.knobs.lock().login_envelope_status = status_code;
    }

    pub fn set_null_instance(&self, null: bool) {
        self.inner.knobs.lock().null_instance = null;
    }

    /// The next `n` connects get a 503.
    pub fn fail_connects(&self, n: usize) {
        self.inner.knobs.lock().failing_connects = n;
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.inner.knobs.lock().unhealthy = unhealthy;
    }
}

impl Drop for FakeUserCenter {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn envelope(status_code: i64, message: &str, data: Value) -> Json<Value> {
    Json(json!({ "status_code": status_code, "message": message, "data": data }))
}

async fn login(State(uc): State<Shared>, Form(form): Form<DeviceForm>) -> (StatusCode, Json<Value>) {
    uc.hits.lock().login += 1;
    let knobs = uc.knobs.lock();

    if let Some(status) = knobs.login_http_status {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({})));
    }
    if let Some(code) = knobs.login_envelope_status {
        return (StatusCode::OK, envelope(code, "login refused", Value::Null));
    }
    if knobs.null_instance {
        return (StatusCode::OK, envelope(200, "ok", json!({ "instance": null })));
    }
    drop(knobs);

    uc.sessions.lock().insert(form.device_id.clone(), form.site_id.clone());
    let instance = json!({
        "zone_id": form.zone_id,
        "site_id": form.site_id,
        "server_ip": "127.0.0.1",
        "instance_id": "fake-0",
        "pod_name": "fake-instance-0",
        "port": uc.port,
        "is_elastic": 0,
        "status": "running",
        "device_id": form.device_id,
    });
    (StatusCode::OK, envelope(200, "ok", json!({ "instance": instance })))
}

async fn logout(State(uc): State<Shared>, Form(form): Form<DeviceForm>) -> Json<Value> {
    uc.hits.lock().logout += 1;
    let known = uc.sessions.lock().remove(&form.device_id).is_some();
    uc.logouts.lock().push(form);
    if known {
        envelope(200, "ok", Value::Null)
    } else {
        envelope(404, "unknown device", Value::Null)
    }
}

async fn connect(State(uc): State<Shared>, Form(_form): Form<DeviceForm>) -> StatusCode {
    uc.hits.lock().connect += 1;
    let mut knobs = uc.knobs.lock();
    if knobs.failing_connects > 0 {
        knobs.failing_connects -= 1;
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

async fn disconnect(State(uc): State<Shared>) -> StatusCode {
    uc.hits.lock().disconnect += 1;
    StatusCode::OK
}

async fn healthz(State(uc): State<Shared>) -> StatusCode {
    uc.hits.lock().healthz += 1;
    if uc.knobs.lock().unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}
