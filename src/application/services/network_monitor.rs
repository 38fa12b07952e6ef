use crate::application::ports::ReachabilityProbe;
use crate::domain::entities::NetworkState;
use crate::shared::config::NetworkConfig;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on one debounce, in multiples of `debounce_millis`.
const SETTLE_WINDOW_FACTOR: u32 = 4;

/// Verified connectivity, derived from OS connectivity events and an active
/// reachability probe.
///
/// * Online requires the OS to report connectivity and the probe to succeed.
/// * Offline requires an OS report confirmed by a failed probe, or
///   `offline_failure_threshold` consecutive failed periodic probes.
/// * Without a probe the OS flag is trusted as-is.
///
/// Starts offline; the first verified online is treated as a reconnection.
pub struct NetworkMonitor {
    probe: Option<Arc<dyn ReachabilityProbe>>,
    config: NetworkConfig,
    os_online: AtomicBool,
    consecutive_failures: AtomicU32,
    state: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    pub fn new(probe: Option<Arc<dyn ReachabilityProbe>>, config: NetworkConfig) -> Self {
        let (state, _) = watch::channel(NetworkState::default());
        Self {
            probe,
            config,
            os_online: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            state,
        }
    }

    pub fn state(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().is_online
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    /// Acknowledges a pending reconnection. Returns `true` at most once per
    /// offline to online transition; transitions that happen before the
    /// acknowledgment collapse into one.
    pub fn take_reconnect(&self) -> bool {
        let mut taken = false;
        self.state.send_if_modified(|state| {
            taken = state.was_offline;
            state.was_offline = false;
            taken
        });
        taken
    }

    /// Feeds one raw OS event through verification immediately, bypassing
    /// the debounce applied by [`run`](Self::run).
    pub async fn apply_os_status(&self, online: bool) -> NetworkState {
        self.os_online.store(online, Ordering::SeqCst);
        debug!(target: "fieldsync::network", os_online = online, "os connectivity reported");

        let reachable = match &self.probe {
            Some(probe) => probe.probe().await,
            None => online,
        };

        if reachable {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
        // An OS drop that the probe contradicts is a blip.
        let verified = if online { reachable } else { reachable && self.is_online() };
        self.set_online(verified)
    }

    /// One periodic verification round.
    pub async fn verify(&self) -> NetworkState {
        let os_online = self.os_online.load(Ordering::SeqCst);
        let Some(probe) = &self.probe else {
            return self.set_online(os_online);
        };

        if probe.probe().await {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            if os_online {
                return self.set_online(true);
            }
            return self.state();
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target: "fieldsync::network", failures, "reachability probe failed");
        if failures >= self.config.offline_failure_threshold || !self.is_online() {
            return self.set_online(false);
        }
        self.state()
    }

    /// Probes on a fixed interval and consumes debounced OS events until
    /// shutdown.
    pub async fn run(self: Arc<Self>, mut os_events: mpsc::Receiver<bool>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.probe_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let debounce = self.config.debounce();
        let mut events_open = true;

        info!(
            target: "fieldsync::network",
            probe = self.probe.is_some(),
            interval_secs = self.config.probe_interval_secs,
            "network monitor started"
        );

        'monitor: loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.verify().await;
                }
                event = os_events.recv(), if events_open => {
                    let Some(mut online) = event else {
                        events_open = false;
                        continue;
                    };
                    // Settle on the last value once events stop arriving, or
                    // once the settle window runs out under a steady stream.
                    let settle_by = Instant::now() + debounce * SETTLE_WINDOW_FACTOR;
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break 'monitor,
                            next = os_events.recv() => match next {
                                Some(value) => online = value,
                                None => {
                                    events_open = false;
                                    break;
                                }
                            },
                            _ = tokio::time::sleep(debounce) => break,
                            _ = tokio::time::sleep_until(settle_by) => break,
                        }
                    }
                    self.apply_os_status(online).await;
                }
            }
        }

        info!(target: "fieldsync::network", "network monitor stopped");
    }

    fn set_online(&self, online: bool) -> NetworkState {
        let now = Utc::now();
        let changed = self.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            if online {
                state.was_offline = true;
                state.last_online_at = Some(now);
            } else {
                state.last_offline_at = Some(now);
            }
            true
        });

        if changed {
            if online {
                info!(target: "fieldsync::network", "connectivity verified online");
            } else {
                info!(target: "fieldsync::network", "connectivity lost");
            }
        }
        self.state()
    }
}
