/**
 * NETWORK CLIENT - Politique de retry au-dessus du transport
 *
 * RÔLE :
 * Point d'appel unique des workflows vers le UserCenter et les instances.
 *
 * FONCTIONNEMENT :
 * - login / logout / health-check : une seule tentative
 * - connect / disconnect : réessayés selon `RetryPolicy` (tentatives, pause fixe)
 * - Seules les erreurs transitoires (transport, statut HTTP) sont réessayées
 * - Pas de pause après la dernière tentative
 */

use crate::config::NetworkConf;
use crate::error::NetError;
use crate::models::Instance;
use crate::transport::SessionTransport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 2, delay: Duration::from_secs(1) }
    }
}

impl From<&NetworkConf> for RetryPolicy {
    fn from(conf: &NetworkConf) -> Self {
        Self { attempts: conf.connect_attempts.max(1), delay: conf.retry_delay() }
    }
}

#[derive(Clone)]
pub struct NetworkClient {
    transport: Arc<dyn SessionTransport>,
    retry: RetryPolicy,
}

impl NetworkClient {
    pub fn new(transport: Arc<dyn SessionTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub async fn login(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<Instance, NetError> {
        self.transport.login(zone_id, site_id, device_id).await
    }

    pub async fn logout(&self, zone_id: &str, site_id: &str, device_id: &str) -> Result<(), NetError> {
        self.transport.logout(zone_id, site_id, device_id).await
    }

    pub async fn connect(&self, host: &str, port: u16, device_id: &str) -> Result<(), NetError> {
        self.with_retry("connect", || self.transport.connect(host, port, device_id))
            .await
    }

    pub async fn disconnect(&self, host: &str, port: u16) -> Result<(), NetError> {
        self.with_retry("disconnect", || self.transport.disconnect(host, port))
            .await
    }

    pub async fn health_check(&self, host: &str, port: u16) -> bool {
        self.transport.health_check(host, port).await
    }

    async fn with_retry<F, Fut>(&self, op: &'static str, mut call: F) -> Result<(), NetError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), NetError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match call().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            warn!(op, attempt, error = %err, "{} attempt failed", op);
            if !err.is_transient() || attempt >= attempts {
                return Err(NetError::RetriesExhausted { op, attempts: attempt, last: Box::new(err) });
            }
            attempt += 1;
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_once_after_delay() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_connects(1);
        let client = NetworkClient::new(transport.clone(), RetryPolicy::default());

        let start = tokio::time::Instant::now();
        client.connect("10.0.0.1", 9000, "Dev-1").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(transport.calls().connect, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_gives_up_after_policy_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_disconnects(5);
        let policy = RetryPolicy { attempts: 3, delay: Duration::from_millis(250) };
        let client = NetworkClient::new(transport.clone(), policy);

        let start = tokio::time::Instant::now();
        let err = client.disconnect("10.0.0.1", 9000).await.unwrap_err();
        assert!(matches!(err, NetError::RetriesExhausted { op: "disconnect", attempts: 3, .. }));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(transport.calls().disconnect, 3);
    }

    #[tokio::test]
    async fn test_login_is_never_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_login_http_status(Some(500));
        let client = NetworkClient::new(transport.clone(), RetryPolicy::default());

        assert!(client.login("huadong", "hangzhou", "Dev-1").await.is_err());
        assert_eq!(transport.calls().login, 1);
    }

    #[test]
    fn test_policy_from_config() {
        let conf = NetworkConf { connect_attempts: 0, retry_delay_ms: 50, ..Default::default() };
        let policy = RetryPolicy::from(&conf);
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(50));
    }
}
