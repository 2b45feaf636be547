//! Periodic background refresh, owned by whoever started it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::RepositoryStore;
use crate::constants::defaults;

/// Whether anyone is looking at the data right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshIntervals {
    pub light: Duration,
    pub full: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            light: Duration::from_secs(defaults::LIGHT_REFRESH_SECS),
            full: Duration::from_secs(defaults::FULL_REFRESH_SECS),
        }
    }
}

/// Handle to a running refresh loop. Dropping it stops the loop.
pub struct Scheduler {
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the refresh loop on the current runtime.
    ///
    /// While `visibility` reads [`Visibility::Visible`], a light refresh
    /// runs every `intervals.light` and a full one every `intervals.full`.
    /// Becoming visible again triggers a light refresh straight away.
    pub fn start(
        store: Arc<RepositoryStore>,
        mut visibility: watch::Receiver<Visibility>,
        intervals: RefreshIntervals,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut light = interval_at(Instant::now() + intervals.light, intervals.light);
            let mut full = interval_at(Instant::now() + intervals.full, intervals.full);
            light.set_missed_tick_behavior(MissedTickBehavior::Delay);
            full.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut visible = *visibility.borrow_and_update() == Visibility::Visible;

            loop {
                tokio::select! {
                    _ = light.tick() => {
                        if visible {
                            light_refresh(&store).await;
                        }
                    }
                    _ = full.tick() => {
                        if visible {
                            debug!("Running scheduled full refresh");
                            if let Err(e) = store.fetch_repository_metas(true).await {
                                warn!("Scheduled full refresh failed: {:#}", e);
                            }
                        }
                    }
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            debug!("Visibility channel closed, stopping refresh loop");
                            break;
                        }
                        let now_visible = *visibility.borrow_and_update() == Visibility::Visible;
                        if now_visible && !visible {
                            light_refresh(&store).await;
                        }
                        visible = now_visible;
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop. A refresh in flight is abandoned.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn light_refresh(store: &RepositoryStore) {
    debug!("Running light refresh");
    if let Err(e) = store.refresh_catalog().await {
        warn!("Light refresh failed: {:#}", e);
    }
}
