use std::collections::HashMap;

use chrono::{DateTime, Utc};
use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::error::GtfsError;
use super::gtfs_rt;

/// Maximum allowed protobuf response size (50 MB)
const MAX_PROTOBUF_SIZE: usize = 50 * 1024 * 1024;

/// Vehicle state reported by the realtime feed. `Scheduled` doubles as the
/// default for trips the feed says nothing about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    #[default]
    Scheduled,
    IncomingAt,
    StoppedAt,
    InTransit,
}

impl VehicleStatus {
    fn from_feed(raw: i32) -> Self {
        match gtfs_rt::vehicle_position::VehicleStopStatus::try_from(raw) {
            Ok(gtfs_rt::vehicle_position::VehicleStopStatus::IncomingAt) => Self::IncomingAt,
            Ok(gtfs_rt::vehicle_position::VehicleStopStatus::StoppedAt) => Self::StoppedAt,
            Ok(gtfs_rt::vehicle_position::VehicleStopStatus::InTransitTo) => Self::InTransit,
            Err(_) => Self::Scheduled,
        }
    }
}

/// Latest known realtime observation for one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeUpdate {
    /// Signed delay in seconds; 0 when the feed carried none.
    pub delay_seconds: i32,
    pub status: VehicleStatus,
    pub vehicle_id: Option<String>,
    /// Epoch seconds of the observation, absent when the feed had no
    /// timestamp for this vehicle.
    pub observed_at: Option<u64>,
}

/// trip_id -> latest observation, rebuilt wholesale on every refresh.
pub type RealtimeMap = HashMap<String, RealtimeUpdate>;

/// One normalized pass over the realtime feed, plus when it was taken.
#[derive(Debug, Clone)]
pub struct RealtimeSnapshot {
    pub updates: RealtimeMap,
    pub fetched_at: DateTime<Utc>,
}

/// Fetch and decode the GTFS-RT vehicle-position feed.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
) -> Result<gtfs_rt::FeedMessage, GtfsError> {
    let response = client
        .get(url)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(GtfsError::NetworkMessage(format!(
            "GTFS-RT HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await?;

    if bytes.len() > MAX_PROTOBUF_SIZE {
        return Err(GtfsError::NetworkMessage(format!(
            "GTFS-RT response too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_PROTOBUF_SIZE
        )));
    }

    gtfs_rt::FeedMessage::decode(bytes.as_ref()).map_err(GtfsError::from)
}

/// Normalize a decoded feed into a trip_id -> RealtimeUpdate map.
///
/// Entities without vehicle information or without a trip reference are
/// skipped: a position that cannot be correlated to a scheduled trip is
/// useless here. When several entities reference the same trip, the later
/// one in feed order wins; the upstream feed makes no ordering promise and
/// this is accepted as-is.
pub fn normalize_feed(feed: &gtfs_rt::FeedMessage) -> RealtimeMap {
    let mut updates = RealtimeMap::new();
    let mut skipped_without_trip = 0usize;

    for entity in &feed.entity {
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };
        let Some(trip_id) = vehicle.trip.as_ref().and_then(|t| t.trip_id.clone()) else {
            skipped_without_trip += 1;
            continue;
        };

        updates.insert(
            trip_id,
            RealtimeUpdate {
                delay_seconds: vehicle.delay.unwrap_or(0),
                status: vehicle
                    .current_status
                    .map(VehicleStatus::from_feed)
                    .unwrap_or_default(),
                vehicle_id: vehicle.vehicle.as_ref().and_then(|v| v.id.clone()),
                observed_at: vehicle.timestamp,
            },
        );
    }

    if skipped_without_trip > 0 {
        debug!(
            skipped_without_trip,
            "Skipped vehicle positions without a trip reference"
        );
    }

    updates
}
