use crate::error::NetError;
use crate::models::Instance;
use crate::transport::SessionTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub login: usize,
    pub logout: usize,
    pub connect: usize,
    pub disconnect: usize,
    pub health: usize,
}

#[derive(Debug, Default)]
struct Script {
    calls: CallCounts,
    login_http_status: Option<u16>,
    null_instance: bool,
    failing_logins: usize,
    failing_connects: usize,
    failing_disconnects: usize,
    failing_logouts: usize,
    unhealthy_hosts: HashSet<String>,
    logout_requests: Vec<(String, String, String)>,
    login_latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

/// Answers like a healthy UserCenter unless told otherwise.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

fn refused(url: &str, status: u16) -> NetError {
    NetError::Status { url: url.to_string(), status }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounts {
        self.script.lock().calls
    }

    pub fn set_login_http_status(&self, status: Option<u16>) {
        self.script.lock().login_http_status = status;
    }

    pub fn set_null_instance(&self, null: bool) {
        self.script.lock().null_instance = null;
    }

    pub fn fail_logins(&self, n: usize) {
        self.script.lock().failing_logins = n;
    }

    pub fn fail_connects(&self, n: usize) {
        self.script.lock().failing_connects = n;
    }

    pub fn fail_disconnects(&self, n: usize) {
        self.script.lock().failing_disconnects = n;
    }

    pub fn fail_logouts(&self, n: usize) {
        self.script.lock().failing_logouts = n;
    }

    pub fn mark_unhealthy(&self, host: &str) {
        self.script.lock().unhealthy_hosts.insert(host.to_string());
    }

    pub fn set_login_latency(&self, latency: Duration) {
        self.script.lock().login_latency = latency;
    }

    pub fn max_in_flight(&self) -> usize {
        self.script.lock().max_in_flight
    }

    pub fn logout_requests(&self) -> Vec<(String, String, String)> {
        self.script.lock().logout_requests.clone()
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn login(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<Instance, NetError> {
        let latency = {
            let mut s = self.script.lock();
            s.calls.login += 1;
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            s.login_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut s = self.script.lock();
        s.in_flight -= 1;
        if let Some(status) = s.login_http_status {
            return Err(refused("/device/login", status));
        }
        if s.failing_logins > 0 {
            s.failing_logins -= 1;
            return Err(NetError::Envelope { status_code: 500, message: "no instance available".into() });
        }
        if s.null_instance {
            return Err(NetError::MissingInstance);
        }
        Ok(Instance {
            zone_id: zone_id.to_string(),
            site_id: site_id.to_string(),
            server_ip: "10.0.0.1".into(),
            instance_id: "i-1".into(),
            pod_name: "instance-0".into(),
            port: 9000,
            is_elastic: 0,
            status: "running".into(),
            device_id: device_id.to_string(),
        })
    }

    async fn logout(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<(), NetError> {
        let mut s = self.script.lock();
        s.calls.logout += 1;
        s.logout_requests
            .push((zone_id.to_string(), site_id.to_string(), device_id.to_string()));
        if s.failing_logouts > 0 {
            s.failing_logouts -= 1;
            return Err(NetError::Envelope { status_code: 404, message: "unknown device".into() });
        }
        Ok(())
    }

    async fn connect(&self, _host: &str, _port: u16, _device_id: &str) -> Result<(), NetError> {
        let mut s = self.script.lock();
        s.calls.connect += 1;
        if s.failing_connects > 0 {
            s.failing_connects -= 1;
            return Err(refused("/connect", 503));
        }
        Ok(())
    }

    async fn disconnect(&self, _host: &str, _port: u16) -> Result<(), NetError> {
        let mut s = self.script.lock();
        s.calls.disconnect += 1;
        if s.failing_disconnects > 0 {
            s.failing_disconnects -= 1;
            return Err(refused("/disconnect", 503));
        }
        Ok(())
    }

    async fn health_check(&self, host: &str, _port: u16) -> bool {
        let mut s = self.script.lock();
        s.calls.health += 1;
        !s.unhealthy_hosts.contains(host)
    }
}
