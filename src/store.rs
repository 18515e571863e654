//! Shared snapshot store for the two feed slots.
//!
//! Each slot holds the most recent successfully ingested snapshot, or `None`
//! until the first refresh lands. Writers replace a slot wholesale; readers
//! clone the current value so request handling never holds a lock across
//! await points.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::providers::gtfs::realtime::RealtimeSnapshot;
use crate::providers::gtfs::static_data::StopSchedule;

#[derive(Clone, Default)]
pub struct DataStore {
    schedule: Arc<RwLock<Option<StopSchedule>>>,
    realtime: Arc<RwLock<Option<RealtimeSnapshot>>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish_schedule(&self, schedule: StopSchedule) {
        *self.schedule.write().await = Some(schedule);
    }

    pub async fn publish_realtime(&self, snapshot: RealtimeSnapshot) {
        *self.realtime.write().await = Some(snapshot);
    }

    pub async fn schedule(&self) -> Option<StopSchedule> {
        self.schedule.read().await.clone()
    }

    pub async fn realtime(&self) -> Option<RealtimeSnapshot> {
        self.realtime.read().await.clone()
    }
}
