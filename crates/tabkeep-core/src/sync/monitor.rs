//! Connectivity-driven scheduling of sync passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::notifier::ChangeNotifier;
use super::reconciler::Reconciler;
use super::report::PassOutcome;
use crate::config::SyncSettings;
use crate::remote::{ChangeEvent, RemoteGateway, SubscriptionHandle};
use crate::state::SyncState;

/// Watches the connectivity signal and starts passes.
///
/// Passes start on reconnect, on every tick of the sync interval while
/// online and idle, and on manual request. Change subscriptions live only
/// while online.
pub struct ConnectivityMonitor<G: RemoteGateway> {
    reconciler: Arc<Reconciler<G>>,
    connectivity: watch::Receiver<bool>,
    sync_interval: Duration,
}

/// Control handle for a running monitor
pub struct MonitorHandle {
    requests: mpsc::UnboundedSender<bool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask for a pass now; ignored while one is already running.
    pub fn request_sync(&self, verbose: bool) {
        let _ = self.requests.send(verbose);
    }

    /// Stop the monitor. Returns once every pass it started has finished
    /// and its subscription is gone.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Connectivity monitor ended abnormally: {error}");
        }
    }
}

impl<G: RemoteGateway> ConnectivityMonitor<G> {
    pub fn new(
        reconciler: Arc<Reconciler<G>>,
        connectivity: watch::Receiver<bool>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            reconciler,
            connectivity,
            sync_interval: settings.sync_interval,
        }
    }

    pub fn spawn(self) -> MonitorHandle {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(request_rx, shutdown_rx));
        MonitorHandle {
            requests,
            shutdown,
            task,
        }
    }

    async fn run(
        self,
        mut requests: mpsc::UnboundedReceiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let Self {
            reconciler,
            mut connectivity,
            sync_interval,
        } = self;
        let notifier = ChangeNotifier::new(Arc::clone(&reconciler));
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut subscription = None;
        let mut passes = JoinSet::new();

        let first_tick = tokio::time::Instant::now() + sync_interval;
        let mut ticker = tokio::time::interval_at(first_tick, sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if *connectivity.borrow_and_update() {
            go_online(&reconciler, &events_tx, &mut subscription, &mut passes).await;
        } else {
            reconciler.set_status(SyncState::Offline);
        }

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Connectivity signal closed; stopping monitor");
                        break;
                    }
                    if *connectivity.borrow_and_update() {
                        go_online(&reconciler, &events_tx, &mut subscription, &mut passes).await;
                    } else {
                        go_offline(&reconciler, &mut subscription).await;
                    }
                }
                _ = ticker.tick() => {
                    if reconciler.is_online() && !reconciler.is_syncing() {
                        tracing::debug!("Sync interval elapsed: interval={}s", sync_interval.as_secs());
                        spawn_pass(&mut passes, &reconciler, false);
                    }
                }
                request = requests.recv() => {
                    let Some(verbose) = request else {
                        break;
                    };
                    spawn_pass(&mut passes, &reconciler, verbose);
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => reap(joined),
                Some(event) = events.recv() => {
                    if let Err(error) = notifier.apply(event).await {
                        tracing::warn!("Failed to apply remote change: {error}");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        // Passes are never cancelled midway
        if !passes.is_empty() {
            tracing::info!("Waiting for {} running sync pass(es) to finish", passes.len());
        }
        while let Some(joined) = passes.join_next().await {
            reap(joined);
        }

        if let Some(handle) = subscription.take() {
            if let Err(error) = reconciler.gateway().unsubscribe(handle).await {
                tracing::warn!("Failed to stop change subscription: {error}");
            }
        }
    }
}

async fn go_online<G: RemoteGateway>(
    reconciler: &Arc<Reconciler<G>>,
    events: &mpsc::UnboundedSender<ChangeEvent>,
    subscription: &mut Option<SubscriptionHandle>,
    passes: &mut JoinSet<PassOutcome>,
) {
    tracing::info!("Connectivity restored; scheduling sync");
    if !reconciler.is_syncing() {
        reconciler.set_status(SyncState::Online);
    }
    if subscription.is_none() {
        match reconciler.gateway().subscribe(events.clone()).await {
            Ok(handle) => *subscription = Some(handle),
            Err(error) => tracing::warn!("Failed to subscribe to remote changes: {error}"),
        }
    }
    spawn_pass(passes, reconciler, false);
}

async fn go_offline<G: RemoteGateway>(
    reconciler: &Reconciler<G>,
    subscription: &mut Option<SubscriptionHandle>,
) {
    tracing::info!("Connectivity lost; pausing sync");
    if let Some(handle) = subscription.take() {
        if let Err(error) = reconciler.gateway().unsubscribe(handle).await {
            tracing::warn!("Failed to stop change subscription: {error}");
        }
    }
    reconciler.set_status(SyncState::Offline);
}

fn spawn_pass<G: RemoteGateway>(
    passes: &mut JoinSet<PassOutcome>,
    reconciler: &Arc<Reconciler<G>>,
    verbose: bool,
) {
    let reconciler = Arc::clone(reconciler);
    passes.spawn(async move { reconciler.trigger_sync(verbose).await });
}

fn reap(joined: Result<PassOutcome, JoinError>) {
    match joined {
        Ok(outcome) if outcome.is_skipped() => {
            tracing::debug!("Scheduled sync pass skipped: {outcome:?}");
        }
        Ok(_) => {}
        Err(error) => tracing::warn!("Sync pass task ended abnormally: {error}"),
    }
}

/// Periodically ping the remote store and publish reachability.
///
/// Only transport-level failures count as offline; an error response still
/// proves the remote store is reachable.
pub fn spawn_connectivity_probe<G: RemoteGateway>(
    gateway: Arc<G>,
    interval: Duration,
    online: watch::Sender<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if online.is_closed() {
                break;
            }
            let reachable = match gateway.ping().await {
                Ok(()) => true,
                Err(error) => {
                    tracing::debug!("Connectivity probe failed: {error}");
                    !error.is_unavailable()
                }
            };
            online.send_if_modified(|current| {
                if *current == reachable {
                    false
                } else {
                    *current = reachable;
                    true
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::remote::memory::MemoryGateway;
    use crate::services::LocalStore;
    use crate::sync::{LocalMutation, StoreChange};
    use tokio::sync::broadcast;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        reconciler: Arc<Reconciler<MemoryGateway>>,
        gateway: Arc<MemoryGateway>,
        online: watch::Sender<bool>,
        changes: broadcast::Receiver<StoreChange>,
    }

    impl Harness {
        async fn new(online: bool) -> Self {
            let store = LocalStore::open_in_memory().await.unwrap();
            let gateway = Arc::new(MemoryGateway::new());
            let (online_tx, online_rx) = watch::channel(online);
            let reconciler = Arc::new(Reconciler::new(store, Arc::clone(&gateway), online_rx));
            let changes = reconciler.subscribe_changes();
            Self {
                reconciler,
                gateway,
                online: online_tx,
                changes,
            }
        }

        fn spawn_monitor(&self, sync_interval: Duration) -> MonitorHandle {
            let settings = SyncSettings {
                sync_interval,
                ..SyncSettings::default()
            };
            ConnectivityMonitor::new(
                Arc::clone(&self.reconciler),
                self.online.subscribe(),
                &settings,
            )
            .spawn()
        }

        async fn wait_for(&mut self, expected: StoreChange) {
            tokio::time::timeout(WAIT, async {
                loop {
                    if self.changes.recv().await.unwrap() == expected {
                        break;
                    }
                }
            })
            .await
            .unwrap();
        }

        async fn wait_until(&self, condition: impl Fn(&Self) -> bool) {
            tokio::time::timeout(WAIT, async {
                while !condition(self) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_runs_pass_and_manages_subscription() {
        let mut harness = Harness::new(false).await;
        let receipt = harness
            .reconciler
            .record_local_mutation(LocalMutation::Insert(Record::new("TAB-2024-0001")))
            .await
            .unwrap();
        let id = receipt.record.unwrap().id;

        let monitor = harness.spawn_monitor(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.gateway.calls().is_empty());
        assert_eq!(harness.reconciler.status(), SyncState::Offline);

        harness.online.send_replace(true);
        harness.wait_for(StoreChange::PassFinished).await;
        assert!(harness.gateway.record(&id).is_some());
        assert_eq!(harness.gateway.subscriber_count(), 1);
        assert_eq!(harness.reconciler.status(), SyncState::Online);

        harness.online.send_replace(false);
        harness
            .wait_until(|harness| harness.gateway.subscriber_count() == 0)
            .await;
        harness
            .wait_until(|harness| harness.reconciler.status() == SyncState::Offline)
            .await;

        monitor.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_events_reach_the_store_while_online() {
        let mut harness = Harness::new(true).await;
        let monitor = harness.spawn_monitor(Duration::from_secs(3600));
        harness.wait_for(StoreChange::PassFinished).await;

        let remote = Record::new("TAB-7").to_remote_payload();
        harness.gateway.emit(&ChangeEvent::Insert(remote.clone()));
        harness.wait_for(StoreChange::RecordUpdated(remote.id)).await;
        let stored = harness
            .reconciler
            .store()
            .get_record(&remote.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.synced);

        harness.gateway.emit(&ChangeEvent::Delete(remote.id));
        harness.wait_for(StoreChange::RecordDeleted(remote.id)).await;

        monitor.shutdown().await;
        assert_eq!(harness.gateway.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interval_and_manual_requests_start_passes() {
        let mut harness = Harness::new(true).await;
        let monitor = harness.spawn_monitor(Duration::from_millis(50));

        // Reconnect pass plus at least one periodic pass
        harness.wait_for(StoreChange::PassFinished).await;
        harness.wait_for(StoreChange::PassFinished).await;
        monitor.shutdown().await;

        let mut harness = Harness::new(true).await;
        let monitor = harness.spawn_monitor(Duration::from_secs(3600));
        harness.wait_for(StoreChange::PassFinished).await;
        monitor.request_sync(true);
        harness.wait_for(StoreChange::PassFinished).await;
        monitor.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_suppresses_periodic_passes() {
        let harness = Harness::new(false).await;
        let monitor = harness.spawn_monitor(Duration::from_millis(20));
        monitor.request_sync(false);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(harness.gateway.calls().is_empty());
        assert!(harness
            .reconciler
            .store()
            .list_sync_runs(5)
            .await
            .unwrap()
            .is_empty());
        monitor.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_waits_for_the_running_pass() {
        let harness = Harness::new(false).await;
        let receipt = harness
            .reconciler
            .record_local_mutation(LocalMutation::Insert(Record::new("TAB-3")))
            .await
            .unwrap();
        let id = receipt.record.unwrap().id;
        let hold = harness.gateway.hold_listing();

        let monitor = harness.spawn_monitor(Duration::from_secs(3600));
        harness.online.send_replace(true);
        tokio::time::timeout(WAIT, hold.entered.notified())
            .await
            .unwrap();

        let shutdown = tokio::spawn(monitor.shutdown());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!shutdown.is_finished());
        assert!(harness.reconciler.is_syncing());

        hold.release.notify_one();
        tokio::time::timeout(WAIT, shutdown).await.unwrap().unwrap();

        assert!(!harness.reconciler.is_syncing());
        assert!(harness.gateway.record(&id).is_some());
        let runs = harness.reconciler.store().list_sync_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, "success");
        assert_eq!(harness.gateway.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_publishes_reachability() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_unavailable(true);
        let (online_tx, mut online_rx) = watch::channel(true);
        let probe =
            spawn_connectivity_probe(Arc::clone(&gateway), Duration::from_millis(10), online_tx);

        tokio::time::timeout(WAIT, online_rx.wait_for(|online| !*online))
            .await
            .unwrap()
            .unwrap();

        gateway.set_unavailable(false);
        tokio::time::timeout(WAIT, online_rx.wait_for(|online| *online))
            .await
            .unwrap()
            .unwrap();

        probe.abort();
    }
}
