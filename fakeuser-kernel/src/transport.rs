/**
 * SESSION TRANSPORT - Appels HTTP bruts vers UserCenter et instances
 *
 * RÔLE :
 * Les cinq appels externes, une tentative chacun. Les retries sont gérés
 * par `NetworkClient`.
 *
 * FORMAT :
 * - Corps de requête en form-urlencoded
 * - Login/logout : enveloppe JSON `{status_code, message, data}`, `data.instance` requis au login
 * - connect / disconnect / healthz : succès = statut 2xx
 */

use crate::config::UserCenterConf;
use crate::error::NetError;
use crate::models::{Envelope, Instance, LoginData};
use async_trait::async_trait;
use std::time::Duration;

/// The five calls a device workflow can issue.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// POST `{usercenter}/{login_path}`, returns the bound instance.
    async fn login(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<Instance, NetError>;

    /// POST `{usercenter}/{logout_path}`.
    async fn logout(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<(), NetError>;

    /// POST `http://{host}:{port}/connect`.
    async fn connect(&self, host: &str, port: u16, device_id: &str) -> Result<(), NetError>;

    /// GET `http://{host}:{port}/disconnect`.
    async fn disconnect(&self, host: &str, port: u16) -> Result<(), NetError>;

    /// GET `http://{host}:{port}/healthz`; any failure means unhealthy.
    async fn health_check(&self, host: &str, port: u16) -> bool;
}

/// reqwest-backed transport with a per-call timeout.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    usercenter: UserCenterConf,
}

impl HttpTransport {
    pub fn new(usercenter: UserCenterConf, timeout: Duration) -> Result<Self, NetError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fakeuser/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, usercenter })
    }

    fn instance_url(host: &str, port: u16, path: &str) -> String {
        format!("http://{}:{}/{}", host, port, path)
    }

    /// Posts the device form to the UserCenter and unwraps the envelope.
    async fn post_usercenter(
        &self,
        url: String,
        zone_id: &str,
        site_id: &str,
        device_id: &str,
    ) -> Result<Envelope, NetError> {
        let response = self
            .http
            .post(&url)
            .form(&[("zone_id", zone_id), ("site_id", site_id), ("device_id", device_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Status { url, status: status.as_u16() });
        }

        let body = response.bytes().await?;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        if !envelope.is_success() {
            let message = if envelope.message.is_empty() {
                envelope.data.to_string()
            } else {
                envelope.message
            };
            return Err(NetError::Envelope { status_code: envelope.status_code, message });
        }
        Ok(envelope)
    }

    fn expect_success(url: String, response: reqwest::Response) -> Result<(), NetError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NetError::Status { url, status: status.as_u16() })
        }
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn login(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<Instance, NetError> {
        let envelope = self
            .post_usercenter(self.usercenter.login_url(), zone_id, site_id, device_id)
            .await?;
        let data: Option<LoginData> = serde_json::from_value(envelope.data)?;
        data.and_then(|d| d.instance).ok_or(NetError::MissingInstance)
    }

    async fn logout(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<(), NetError> {
        self.post_usercenter(self.usercenter.logout_url(), zone_id, site_id, device_id)
            .await
            .map(|_| ())
    }

    async fn connect(&self, host: &str, port: u16, device_id: &str) -> Result<(), NetError> {
        let url = Self::instance_url(host, port, "connect");
        let response = self
            .http
            .post(&url)
            .form(&[("device_id", device_id)])
            .send()
            .await?;
        Self::expect_success(url, response)
    }

    async fn disconnect(&self, host: &str, port: u16) -> Result<(), NetError> {
        let url = Self::instance_url(host, port, "disconnect");
        let response = self.http.get(&url).send().await?;
        Self::expect_success(url, response)
    }

    async fn health_check(&self, host: &str, port: u16) -> bool {
        let url = Self::instance_url(host, port, "healthz");
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(%url, error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_urls() {
        assert_eq!(
            HttpTransport::instance_url("10.0.0.7", 9000, "healthz"),
            "http://10.0.0.7:9000/healthz"
        );
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_unhealthy() {
        // a port that was just released has nothing listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(UserCenterConf::default(), Duration::from_millis(200)).unwrap();
        assert!(!transport.health_check("127.0.0.1", port).await);
        let err = transport.disconnect("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_transient());
    }
}
