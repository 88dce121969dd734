/**
 * DEVICE REGISTRY - Registre des devices en ligne, par site
 *
 * RÔLE :
 * Source unique de vérité locale sur les sessions ouvertes. Un DeviceID
 * présent = session supposée vivante sur une instance précise.
 *
 * FONCTIONNEMENT :
 * - Un verrou par site : deux sites ne se bloquent jamais entre eux
 * - `reserve` vérifie et réserve un ID sous le même verrou (pas de fenêtre de course)
 * - `commit` promeut la réservation en device en ligne, `release` l'abandonne
 * - Les réservations ne comptent jamais dans `count`
 * - Itération en ordre lexical des DeviceID (sélection reproductible)
 */

use crate::models::Device;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SiteDevices {
    online: BTreeMap<String, Device>,
    pending: HashSet<String>,
}

impl SiteDevices {
    fn knows(&self, device_id: &str) -> bool {
        self.online.contains_key(device_id) || self.pending.contains(device_id)
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    sites: RwLock<HashMap<String, Arc<Mutex<SiteDevices>>>>,
}

pub type SharedRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn site(&self, site_id: &str) -> Arc<Mutex<SiteDevices>> {
        if let Some(site) = self.sites.read().get(site_id) {
            return site.clone();
        }
        self.sites
            .write()
            .entry(site_id.to_string())
            .or_default()
            .clone()
    }

    /// Lookup that never creates the site.
    fn existing(&self, site_id: &str) -> Option<Arc<Mutex<SiteDevices>>> {
        self.sites.read().get(site_id).cloned()
    }

    /// Draws IDs from `generate` until one is unknown to the site, and reserves it.
    pub fn reserve<F>(&self, site_id: &str, mut generate: F) -> String
    where
        F: FnMut() -> String,
    {
        let site = self.site(site_id);
        let mut devices = site.lock();
        loop {
            let candidate = generate();
            if !devices.knows(&candidate) {
                devices.pending.insert(candidate.clone());
                return candidate;
            }
            tracing::debug!(site = site_id, device = %candidate, "device id collision, drawing again");
        }
    }

    /// Drops a reservation that never made it online.
    pub fn release(&self, site_id: &str, device_id: &str) {
        if let Some(site) = self.existing(site_id) {
            site.lock().pending.remove(device_id);
        }
    }

    /// Promotes a reserved ID to an online device.
    pub fn commit(&self, device: Device) {
        let site = self.site(&device.site_id);
        let mut devices = site.lock();
        devices.pending.remove(&device.device_id);
        devices.online.insert(device.device_id.clone(), device);
    }

    /// Stores only if the ID is neither online nor reserved.
    pub fn insert_if_absent(&self, device: Device) -> bool {
        let site = self.site(&device.site_id);
        let mut devices = site.lock();
        if devices.knows(&device.device_id) {
            return false;
        }
        devices.online.insert(device.device_id.clone(), device);
        true
    }

    pub fn store(&self, device: Device) {
        self.site(&device.site_id)
            .lock()
            .online
            .insert(device.device_id.clone(), device);
    }

    pub fn remove(&self, site_id: &str, device_id: &str) -> Option<Device> {
        self.existing(site_id)?.lock().online.remove(device_id)
    }

    pub fn contains(&self, site_id: &str, device_id: &str) -> bool {
        self.existing(site_id)
            .is_some_and(|site| site.lock().online.contains_key(device_id))
    }

    pub fn count(&self, site_id: &str) -> usize {
        self.existing(site_id)
            .map(|site| site.lock().online.len())
            .unwrap_or(0)
    }

    /// Visits online devices in DeviceID order until `visit` returns false.
    pub fn for_each_until<F>(&self, site_id: &str, mut visit: F)
    where
        F: FnMut(&Device) -> bool,
    {
        let Some(site) = self.existing(site_id) else { return };
        let devices = site.lock();
        for device in devices.online.values() {
            if !visit(device) {
                break;
            }
        }
    }

    /// Copy of the site's online devices, DeviceID order.
    pub fn snapshot(&self, site_id: &str) -> Vec<Device> {
        let mut out = Vec::new();
        self.for_each_until(site_id, |d| {
            out.push(d.clone());
            true
        });
        out
    }

    /// Sites that have held a device or a reservation.
    pub fn sites(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sites.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
