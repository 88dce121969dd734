/**
 * DEVICE WORKFLOWS - Login et logout des devices synthétiques
 *
 * RÔLE :
 * Amène N devices en ligne (ou hors ligne) pour un site, chaque device étant
 * une petite machine à états réseau exécutée dans sa propre tâche tokio.
 *
 * FONCTIONNEMENT :
 * - Login : réservation ID → UserCenter login → instance connect (retry) → commit registre
 * - Logout : health-check de tous les devices du site, puis sur les N premiers
 *   sains (ordre DeviceID) : disconnect (retry) → UserCenter logout → retrait du registre
 * - Le retrait a lieu même si disconnect/logout échoue (pas de sessions zombies locales)
 * - Un sémaphore borne le nombre de workflows en vol
 * - L'appelant attend la fin de toutes les tâches (barrière) avant de rendre le rapport
 */

use crate::client::NetworkClient;
use crate::error::NetError;
use crate::models::Device;
use crate::registry::SharedRegistry;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginReport {
    pub requested: usize,
    pub logged_in: Vec<String>,
}

impl LoginReport {
    pub fn succeeded(&self) -> usize {
        self.logged_in.len()
    }

    pub fn failures(&self) -> usize {
        self.requested.saturating_sub(self.logged_in.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutReport {
    pub requested: usize,
    pub healthy_candidates: usize,
    /// Devices taken out of the registry, whatever the remote outcome.
    pub removed: Vec<String>,
    /// Devices whose disconnect and logout both succeeded.
    pub logged_out: Vec<String>,
}

impl LogoutReport {
    pub fn succeeded(&self) -> usize {
        self.logged_out.len()
    }

    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.logged_out.len())
    }
}

#[derive(Debug, thiserror::Error)]
enum LoginFailure {
    #[error("usercenter login failed: {0}")]
    Login(#[source] NetError),
    #[error("instance {host}:{port} refused connect: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: NetError,
    },
}

/// Everything a device workflow needs, shared by every spawned task.
#[derive(Clone)]
pub struct Fleet {
    zone_id: Arc<str>,
    registry: SharedRegistry,
    client: NetworkClient,
    permits: Arc<Semaphore>,
}

impl Fleet {
    pub fn new(zone_id: &str, registry: SharedRegistry, client: NetworkClient, max_in_flight: usize) -> Self {
        Self {
            zone_id: Arc::from(zone_id),
            registry,
            client,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Logs `num` new devices into `site_id` and waits for all of them.
    pub async fn login_devices(&self, site_id: &str, num: usize) -> LoginReport {
        let mut tasks = JoinSet::new();
        for _ in 0..num {
            let fleet = self.clone();
            let site = site_id.to_string();
            tasks.spawn(async move {
                let _permit = fleet.permits.clone().acquire_owned().await.ok();
                fleet.login_one(&site).await
            });
        }

        let mut logged_in = Vec::with_capacity(num);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(device_id)) => logged_in.push(device_id),
                Ok(Err(e)) => warn!(site = site_id, error = %e, "device login failed"),
                Err(e) => warn!(site = site_id, error = %e, "login task aborted"),
            }
        }
        logged_in.sort();

        info!(
            site = site_id,
            requested = num,
            succeeded = logged_in.len(),
            "[{}] {} devices logged in",
            preview_head(&logged_in),
            logged_in.len()
        );
        LoginReport { requested: num, logged_in }
    }

    async fn login_one(&self, site_id: &str) -> Result<String, LoginFailure> {
        let device_id = self
            .registry
            .reserve(site_id, || format!("Dev-{}", Uuid::new_v4()));

        let instance = match self.client.login(&self.zone_id, site_id, &device_id).await {
            Ok(instance) => instance,
            Err(e) => {
                self.registry.release(site_id, &device_id);
                return Err(LoginFailure::Login(e));
            }
        };

        if let Err(source) = self
            .client
            .connect(&instance.server_ip, instance.port, &device_id)
            .await
        {
            self.registry.release(site_id, &device_id);
            return Err(LoginFailure::Connect { host: instance.server_ip, port: instance.port, source });
        }

        self.registry.commit(Device {
            device_id: device_id.clone(),
            zone_id: self.zone_id.to_string(),
            site_id: site_id.to_string(),
            host: instance.server_ip,
            port: instance.port,
        });
        debug!(site = site_id, device = %device_id, "device online");
        Ok(device_id)
    }

    /// Takes up to `num` healthy devices of `site_id` offline and waits for all of them.
    pub async fn logout_devices(&self, site_id: &str, num: usize) -> LogoutReport {
        let healthy = self.healthy_devices(site_id).await;
        let healthy_candidates = healthy.len();
        let selected: Vec<Device> = healthy.into_iter().take(num).collect();

        let mut tasks = JoinSet::new();
        for device in selected {
            let fleet = self.clone();
            tasks.spawn(async move {
                let _permit = fleet.permits.clone().acquire_owned().await.ok();
                let ok = fleet.logout_one(&device).await;
                fleet.registry.remove(&device.site_id, &device.device_id);
                (device.device_id, ok)
            });
        }

        let mut removed = Vec::new();
        let mut logged_out = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device_id, ok)) => {
                    if ok {
                        logged_out.push(device_id.clone());
                    }
                    removed.push(device_id);
                }
                Err(e) => warn!(site = site_id, error = %e, "logout task aborted"),
            }
        }
        removed.sort();
        logged_out.sort();

        info!(
            site = site_id,
            requested = num,
            healthy = healthy_candidates,
            succeeded = logged_out.len(),
            "[{}] {} devices logged out",
            preview_head_tail(&logged_out),
            logged_out.len()
        );
        if logged_out.len() != num {
            warn!(
                site = site_id,
                "Trying to log out {} devices, but only {} devices logged out",
                num,
                logged_out.len()
            );
        }

        LogoutReport { requested: num, healthy_candidates, removed, logged_out }
    }

    /// Devices of the site whose instance answers its health endpoint, DeviceID order.
    async fn healthy_devices(&self, site_id: &str) -> Vec<Device> {
        let mut tasks = JoinSet::new();
        for device in self.registry.snapshot(site_id) {
            let fleet = self.clone();
            tasks.spawn(async move {
                let _permit = fleet.permits.clone().acquire_owned().await.ok();
                let healthy = fleet.client.health_check(&device.host, device.port).await;
                (device, healthy)
            });
        }

        let mut healthy = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, true)) => healthy.push(device),
                Ok((device, false)) => {
                    debug!(site = site_id, device = %device.device_id, host = %device.host, "instance unhealthy, skipping")
                }
                Err(e) => warn!(site = site_id, error = %e, "health check task aborted"),
            }
        }
        healthy.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        healthy
    }

    async fn logout_one(&self, device: &Device) -> bool {
        if let Err(e) = self.client.disconnect(&device.host, device.port).await {
            warn!(device = %device.device_id, error = %e, "failed to disconnect instance");
            return false;
        }
        if let Err(e) = self
            .client
            .logout(&device.zone_id, &device.site_id, &device.device_id)
            .await
        {
            warn!(device = %device.device_id, error = %e, "failed to log out from usercenter");
            return false;
        }
        true
    }
}

/// First three IDs, then "..." when there are more.
pub fn preview_head(ids: &[String]) -> String {
    if ids.len() > 3 {
        let mut shown: Vec<&str> = ids[..3].iter().map(String::as_str).collect();
        shown.push("...");
        shown.join(", ")
    } else {
        ids.join(", ")
    }
}

/// First three IDs, "...", and the last one when there are more than four.
pub fn preview_head_tail(ids: &[String]) -> String {
    if ids.len() > 4 {
        let mut shown: Vec<&str> = ids[..3].iter().map(String::as_str).collect();
        shown.push("...");
        shown.push(&ids[ids.len() - 1]);
        shown.join(", ")
    } else {
        ids.join(", ")
    }
}
