//! Background synchronization of the static timetable and the realtime
//! vehicle-position feed.
//!
//! Two independent loops refresh the two [`DataStore`] slots on their own
//! intervals. A failed refresh keeps the previous snapshot in place, with
//! one exception: a static feed that downloads fine but cannot be parsed
//! replaces the schedule with an empty one, so callers stop being served a
//! stale timetable that no longer matches the published archive.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::providers::gtfs::error::GtfsError;
use crate::providers::gtfs::GtfsProvider;
use crate::store::DataStore;

/// Manages the background refresh loops for both feed slots.
pub struct SyncManager {
    provider: GtfsProvider,
    store: DataStore,
    static_refresh_secs: u64,
    realtime_refresh_secs: u64,
}

impl SyncManager {
    pub fn new(config: &Config, store: DataStore) -> Result<Self, GtfsError> {
        Ok(Self {
            provider: GtfsProvider::new(config.gtfs.clone(), config.target.clone())?,
            store,
            static_refresh_secs: config.gtfs.static_refresh_secs,
            realtime_refresh_secs: config.gtfs.realtime_refresh_secs,
        })
    }

    /// Start the background refresh loops. Runs forever.
    pub async fn start(self: Arc<Self>) {
        info!(
            static_secs = self.static_refresh_secs,
            realtime_secs = self.realtime_refresh_secs,
            "Starting sync manager"
        );

        let static_self = self.clone();
        let static_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                static_self.static_refresh_secs,
            ));
            loop {
                // First tick fires immediately, so the initial refresh happens at startup.
                interval.tick().await;
                static_self.refresh_static().await;
            }
        });

        let realtime_self = self.clone();
        let realtime_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                realtime_self.realtime_refresh_secs,
            ));
            loop {
                interval.tick().await;
                realtime_self.refresh_realtime().await;
            }
        });

        // Both loops run forever.
        let _ = tokio::join!(static_handle, realtime_handle);
    }

    async fn refresh_static(&self) {
        match self.provider.refresh_static_schedule().await {
            Ok(schedule) => {
                self.store.publish_schedule(schedule).await;
            }
            Err(e) if e.is_malformed_data() => {
                // The archive downloaded but its contents are unusable, so
                // whatever we served before no longer reflects the feed.
                error!(error = %e, "Static feed is malformed, publishing empty schedule");
                self.store
                    .publish_schedule(self.provider.empty_schedule())
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to refresh static feed, keeping existing data");
            }
        }
    }

    async fn refresh_realtime(&self) {
        match self.provider.refresh_realtime().await {
            Ok(snapshot) => {
                debug!(updates = snapshot.updates.len(), "Refreshed realtime feed");
                self.store.publish_realtime(snapshot).await;
            }
            Err(e) => {
                error!(error = %e, "Failed to refresh realtime feed, keeping existing data");
            }
        }
    }
}
