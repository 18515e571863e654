//! GTFS feed provider.
//!
//! Downloads and caches the static GTFS schedule (ZIP), slices it down to the
//! configured stop, and polls the GTFS-RT vehicle-position protobuf feed for
//! per-trip delay observations.

pub mod error;
pub mod realtime;
pub mod static_data;

/// Generated protobuf bindings for the vendored GTFS-RT subset
/// (see proto/gtfs-realtime.proto).
pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}

use chrono::Utc;
use tracing::info;

use crate::config::{GtfsSyncConfig, TargetStop};

use error::GtfsError;
use realtime::RealtimeSnapshot;
use static_data::StopSchedule;

pub struct GtfsProvider {
    client: reqwest::Client,
    config: GtfsSyncConfig,
    target: TargetStop,
}

impl GtfsProvider {
    pub fn new(config: GtfsSyncConfig, target: TargetStop) -> Result<Self, GtfsError> {
        let client = reqwest::Client::builder()
            .user_agent("tam-departures/0.1")
            .build()?;

        Ok(Self {
            client,
            config,
            target,
        })
    }

    /// Download (if needed) the static GTFS zip and extract the target
    /// stop's schedule from it.
    pub async fn refresh_static_schedule(&self) -> Result<StopSchedule, GtfsError> {
        info!("Refreshing static GTFS schedule...");

        let zip_path = static_data::download_feed(
            &self.client,
            &self.config.static_feed_url,
            &self.config.cache_dir,
        )
        .await?;

        let target = self.target.clone();
        let schedule =
            tokio::task::spawn_blocking(move || static_data::load_stop_schedule(&zip_path, &target))
                .await??;

        info!(
            departures = schedule.departures.len(),
            route = %schedule.route_id,
            "Loaded stop schedule into memory"
        );

        Ok(schedule)
    }

    /// Empty schedule for the configured target, published when the static
    /// feed turns out to be unusable.
    pub fn empty_schedule(&self) -> StopSchedule {
        StopSchedule::empty(&self.target)
    }

    /// Fetch the realtime feed and normalize it into a per-trip map.
    pub async fn refresh_realtime(&self) -> Result<RealtimeSnapshot, GtfsError> {
        let feed = realtime::fetch_feed(&self.client, &self.config.realtime_feed_url).await?;
        let updates = realtime::normalize_feed(&feed);

        Ok(RealtimeSnapshot {
            updates,
            fetched_at: Utc::now(),
        })
    }
}
