/**
 * POPULATION RECONCILER - Diff cible/réalisé par site et par tick
 *
 * RÔLE :
 * Pour une minute simulée, compare le nombre cible de devices en ligne de
 * chaque site au nombre réalisé au tick précédent, et pilote la flotte.
 *
 * FONCTIONNEMENT :
 * - Premier tick : la cible entière est une population initiale à connecter
 * - Ensuite : diff > 0 → logins, diff < 0 → logouts, diff = 0 → rien
 * - Site inconnu après le premier tick : anomalie loggée, site ignoré
 * - Sites traités un par un en ordre lexical (reproductible)
 * - Réalisé = taille du registre du site une fois ses workflows terminés
 */

use crate::models::{ReconciliationOutcome, SimTime, SiteTargets};
use crate::stats::ReplayStats;
use crate::workflow::Fleet;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What to do with one site this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAction {
    Login(usize),
    Logout(usize),
    Hold,
    /// Site has no previous record and this is not the first tick.
    Skip,
}

/// Decides the action for a site from its target and previous realized count.
pub fn plan(target: usize, previous: Option<usize>, first_tick: bool) -> SiteAction {
    match previous {
        None if first_tick => {
            if target > 0 {
                SiteAction::Login(target)
            } else {
                SiteAction::Hold
            }
        }
        None => SiteAction::Skip,
        Some(prev) if target > prev => SiteAction::Login(target - prev),
        Some(prev) if target < prev => SiteAction::Logout(prev - target),
        Some(_) => SiteAction::Hold,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub outcomes: Vec<ReconciliationOutcome>,
    /// Sites skipped because they showed up after the first tick.
    pub skipped_sites: Vec<String>,
}

pub struct Reconciler {
    fleet: Fleet,
    prev_records: BTreeMap<String, usize>,
    first_tick: bool,
    stats: ReplayStats,
}

impl Reconciler {
    pub fn new(fleet: Fleet, stats: ReplayStats) -> Self {
        Self { fleet, prev_records: BTreeMap::new(), first_tick: true, stats }
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn previous(&self, site_id: &str) -> Option<usize> {
        self.prev_records.get(site_id).copied()
    }

    /// Runs one tick to completion: every workflow spawned here has finished on return.
    pub async fn reconcile(&mut self, at: SimTime, targets: &SiteTargets) -> TickReport {
        let mut report = TickReport::default();

        for (site_id, &target) in targets {
            let previous = self.prev_records.get(site_id).copied();
            let mut login_failures = 0;

            match plan(target, previous, self.first_tick) {
                SiteAction::Skip => {
                    warn!(site = %site_id, %at, wanted = target, "no previous record found, skipping site");
                    self.stats.record_anomaly();
                    report.skipped_sites.push(site_id.clone());
                    continue;
                }
                SiteAction::Login(num) => {
                    let login = self.fleet.login_devices(site_id, num).await;
                    login_failures = login.failures();
                    self.stats.record_logins(num, login_failures);
                    if login_failures != 0 {
                        warn!(site = %site_id, "{} devices failed to login", login_failures);
                    }
                }
                SiteAction::Logout(num) => {
                    let logout = self.fleet.logout_devices(site_id, num).await;
                    self.stats
                        .record_logouts(num, logout.succeeded(), logout.removed.len());
                }
                SiteAction::Hold => {}
            }

            let instances = self.fleet.registry().count(site_id);
            info!(site = %site_id, %at, wanted = target, online = instances, "{} devices are online now", instances);
            self.prev_records.insert(site_id.clone(), instances);
            report.outcomes.push(ReconciliationOutcome {
                site_id: site_id.clone(),
                date: at,
                instances,
                login_failures,
            });
        }

        self.first_tick = false;
        self.stats.record_tick();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{NetworkClient, RetryPolicy};
    use crate::registry::DeviceRegistry;
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;

    fn reconciler(transport: Arc<ScriptedTransport>) -> Reconciler {
        let client = NetworkClient::new(transport, RetryPolicy::default());
        let fleet = Fleet::new("huadong", Arc::new(DeviceRegistry::new()), client, 64);
        Reconciler::new(fleet, ReplayStats::new())
    }

    fn minute(m: u32) -> SimTime {
        format!("2021-01-01 00:{:02}:00", m).parse().unwrap()
    }

    fn targets(pairs: &[(&str, usize)]) -> SiteTargets {
        pairs.iter().map(|(s, n)| (s.to_string(), *n)).collect()
    }

    #[test]
    fn test_plan_policy() {
        assert_eq!(plan(10, None, true), SiteAction::Login(10));
        assert_eq!(plan(0, None, true), SiteAction::Hold);
        assert_eq!(plan(10, None, false), SiteAction::Skip);
        assert_eq!(plan(12, Some(10), false), SiteAction::Login(2));
        assert_eq!(plan(9, Some(12), false), SiteAction::Logout(3));
        assert_eq!(plan(9, Some(9), false), SiteAction::Hold);
    }

    #[tokio::test]
    async fn test_initial_then_grow_then_shrink() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut rec = reconciler(transport.clone());

        // initial population
        let tick = rec.reconcile(minute(0), &targets(&[("siteA", 10)])).await;
        assert_eq!(
            tick.outcomes,
            vec![ReconciliationOutcome { site_id: "siteA".into(), date: minute(0), instances: 10, login_failures: 0 }]
        );
        assert_eq!(transport.calls().login, 10);

        // +2
        let tick = rec.reconcile(minute(1), &targets(&[("siteA", 12)])).await;
        assert_eq!(transport.calls().login, 12);
        assert_eq!(tick.outcomes[0].instances, 12);

        // -3
        let tick = rec.reconcile(minute(2), &targets(&[("siteA", 9)])).await;
        assert_eq!(transport.calls().logout, 3);
        assert_eq!(tick.outcomes[0].instances, 9);
        assert_eq!(rec.previous("siteA"), Some(9));

        // unchanged target is still recorded
        let tick = rec.reconcile(minute(3), &targets(&[("siteA", 9)])).await;
        assert_eq!(tick.outcomes.len(), 1);
        assert_eq!(transport.calls().login, 12);
        assert_eq!(transport.calls().logout, 3);
    }

    #[tokio::test]
    async fn test_failures_feed_next_diff() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_logins(3);
        let mut rec = reconciler(transport.clone());

        let tick = rec.reconcile(minute(0), &targets(&[("siteA", 10)])).await;
        assert_eq!(tick.outcomes[0].instances, 7);
        assert_eq!(tick.outcomes[0].login_failures, 3);

        // diff is computed against what was realized, not against the old target
        rec.reconcile(minute(1), &targets(&[("siteA", 10)])).await;
        assert_eq!(transport.calls().login, 13);
        assert_eq!(rec.fleet().registry().count("siteA"), 10);
    }

    #[tokio::test]
    async fn test_late_site_is_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut rec = reconciler(transport.clone());

        rec.reconcile(minute(0), &targets(&[("siteA", 2)])).await;
        rec.reconcile(minute(1), &targets(&[("siteA", 2)])).await;
        let tick = rec
            .reconcile(minute(2), &targets(&[("siteA", 2), ("siteB", 5)]))
            .await;

        assert_eq!(tick.skipped_sites, vec!["siteB".to_string()]);
        assert_eq!(tick.outcomes.len(), 1);
        assert_eq!(rec.fleet().registry().count("siteB"), 0);
        assert_eq!(rec.previous("siteB"), None);
        assert_eq!(transport.calls().login, 2);
    }

    #[tokio::test]
    async fn test_sites_processed_in_lexical_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut rec = reconciler(transport);

        let tick = rec
            .reconcile(minute(0), &targets(&[("ningbo", 1), ("hangzhou", 2), ("wenzhou", 0)]))
            .await;
        let order: Vec<&str> = tick.outcomes.iter().map(|o| o.site_id.as_str()).collect();
        assert_eq!(order, vec!["hangzhou", "ningbo", "wenzhou"]);
        assert_eq!(tick.outcomes[2].instances, 0);
    }

    #[tokio::test]
    async fn test_logout_limited_by_healthy_candidates() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut rec = reconciler(transport.clone());
        rec.reconcile(minute(0), &targets(&[("siteA", 5)])).await;

        // every instance goes dark: nothing can be logged out
        transport.mark_unhealthy("10.0.0.1");
        let tick = rec.reconcile(minute(1), &targets(&[("siteA", 2)])).await;
        assert_eq!(transport.calls().logout, 0);
        assert_eq!(tick.outcomes[0].instances, 5);
    }
}
