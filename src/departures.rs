//! Merge of the static stop schedule with realtime delay observations.
//!
//! Everything here is pure: the inputs are snapshots read from the data
//! store and the output is computed fresh on every query, never cached.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use crate::providers::gtfs::realtime::{RealtimeMap, VehicleStatus};
use crate::providers::gtfs::static_data::StopSchedule;

/// One upcoming departure as served to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CombinedDeparture {
    /// Theoretical departure time straight from the schedule, "HH:MM:SS".
    pub scheduled_time: String,
    /// Delay-adjusted departure time, "HH:MM:00". The seconds component is
    /// always zeroed and hours are not wrapped at 24.
    pub departure_time: String,
    pub realtime: RealtimeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RealtimeInfo {
    /// Delay in seconds; 0 when the trip has no realtime match.
    pub delay: i32,
    pub status: VehicleStatus,
    /// ISO-8601 instant of the underlying observation, null when the feed
    /// carried no timestamp or the trip has no realtime match.
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("unparseable scheduled departure time: {0:?}")]
    BadScheduledTime(String),
}

/// Current local time of day formatted like GTFS departure_time values, so
/// plain string comparison is time-ordering-equivalent within a service day.
pub fn current_time_of_day(tz: Tz) -> String {
    Utc::now().with_timezone(&tz).format("%H:%M:%S").to_string()
}

/// Combine the stop schedule with the realtime map at reference time `now`
/// (an "HH:MM:SS" local time-of-day string).
///
/// Departures already past are dropped, the rest are sorted ascending by
/// scheduled time (stable, so ties keep schedule order) and annotated with
/// their realtime observation, defaulting to on-time/`SCHEDULED` for trips
/// the feed says nothing about.
///
/// Known limitation: the string comparison does not place post-midnight
/// trips (scheduled past "24:00:00") correctly relative to early-morning
/// `now` values. The upstream schedule format behaves the same way and this
/// is deliberately not corrected here.
pub fn combine(
    schedule: &StopSchedule,
    realtime: &RealtimeMap,
    now: &str,
) -> Result<Vec<CombinedDeparture>, MergeError> {
    let mut upcoming: Vec<_> = schedule
        .departures
        .iter()
        .filter(|d| d.departure_time.as_str() >= now)
        .collect();
    upcoming.sort_by(|a, b| a.departure_time.cmp(&b.departure_time));

    let mut combined = Vec::with_capacity(upcoming.len());
    for departure in upcoming {
        let update = realtime.get(&departure.trip_id);
        let delay = update.map(|u| u.delay_seconds).unwrap_or(0);

        let departure_time = adjust_departure_time(&departure.departure_time, delay)
            .ok_or_else(|| MergeError::BadScheduledTime(departure.departure_time.clone()))?;

        combined.push(CombinedDeparture {
            scheduled_time: departure.departure_time.clone(),
            departure_time,
            realtime: RealtimeInfo {
                delay,
                status: update.map(|u| u.status).unwrap_or_default(),
                last_update: update.and_then(|u| u.observed_at).and_then(format_observed_at),
            },
        });
    }

    Ok(combined)
}

/// Shift an "HH:MM:SS" value forward by whole minutes of delay
/// (floor(delay / 60), so -90s shifts back two minutes).
///
/// Hours/minutes are renormalized with euclidean div/mod 60; hours may
/// exceed 23 and there is no day rollover. Seconds are dropped.
fn adjust_departure_time(scheduled: &str, delay_seconds: i32) -> Option<String> {
    let (hours, minutes) = parse_time_of_day(scheduled)?;
    let total_minutes = hours * 60 + minutes + i64::from(delay_seconds).div_euclid(60);
    Some(format!(
        "{:02}:{:02}:00",
        total_minutes.div_euclid(60),
        total_minutes.rem_euclid(60)
    ))
}

fn parse_time_of_day(s: &str) -> Option<(i64, i64)> {
    let mut parts = s.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let _seconds: i64 = parts.next()?.parse().ok()?;
    Some((hours, minutes))
}

fn format_observed_at(epoch_secs: u64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(epoch_secs as i64, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::gtfs::realtime::RealtimeUpdate;
    use crate::providers::gtfs::static_data::ScheduledDeparture;
    use std::collections::HashMap;

    fn scheduled(trip_id: &str, departure_time: &str) -> ScheduledDeparture {
        ScheduledDeparture {
            trip_id: trip_id.to_string(),
            stop_sequence: "1".to_string(),
            departure_time: departure_time.to_string(),
            arrival_time: departure_time.to_string(),
        }
    }

    fn make_schedule(departures: Vec<ScheduledDeparture>) -> StopSchedule {
        StopSchedule {
            route_id: "4-13".to_string(),
            route_name: "Vert-Bois → Université".to_string(),
            departures,
            loaded_at: Utc::now(),
        }
    }

    fn update(delay_seconds: i32, status: VehicleStatus, observed_at: Option<u64>) -> RealtimeUpdate {
        RealtimeUpdate {
            delay_seconds,
            status,
            vehicle_id: None,
            observed_at,
        }
    }

    #[test]
    fn past_departures_are_filtered_out() {
        let schedule = make_schedule(vec![
            scheduled("T1", "07:00:00"),
            scheduled("T2", "09:00:00"),
            scheduled("T3", "08:00:00"),
        ]);
        let result = combine(&schedule, &HashMap::new(), "08:00:00").unwrap();

        let times: Vec<&str> = result.iter().map(|d| d.scheduled_time.as_str()).collect();
        // "08:00:00" itself is kept (>= comparison), "07:00:00" is not.
        assert_eq!(times, vec!["08:00:00", "09:00:00"]);
    }

    #[test]
    fn output_sorted_with_stable_ties() {
        let schedule = make_schedule(vec![
            scheduled("B", "09:05:00"),
            scheduled("A", "09:00:00"),
            scheduled("C", "09:05:00"),
        ]);
        let realtime: RealtimeMap = [
            ("B".to_string(), update(60, VehicleStatus::InTransit, None)),
            ("C".to_string(), update(120, VehicleStatus::StoppedAt, None)),
        ]
        .into_iter()
        .collect();

        let result = combine(&schedule, &realtime, "00:00:00").unwrap();
        assert_eq!(result[0].scheduled_time, "09:00:00");
        // Equal scheduled times keep their original relative order: B before C.
        assert_eq!(result[1].realtime.delay, 60);
        assert_eq!(result[2].realtime.delay, 120);
    }

    #[test]
    fn missing_realtime_match_gets_defaults() {
        let schedule = make_schedule(vec![scheduled("T1", "09:00:00")]);
        let result = combine(&schedule, &HashMap::new(), "08:00:00").unwrap();

        assert_eq!(result[0].realtime.delay, 0);
        assert_eq!(result[0].realtime.status, VehicleStatus::Scheduled);
        assert_eq!(result[0].realtime.last_update, None);
        assert_eq!(result[0].departure_time, "09:00:00");
    }

    #[test]
    fn delay_adjustment_rolls_minutes_and_hours() {
        // 90s of delay is one whole minute; 59+1 rolls into the next hour.
        assert_eq!(adjust_departure_time("08:59:30", 90), Some("09:01:00".to_string()));
        assert_eq!(adjust_departure_time("09:00:00", 0), Some("09:00:00".to_string()));
        // floor(-90/60) = -2 minutes.
        assert_eq!(adjust_departure_time("09:00:00", -90), Some("08:58:00".to_string()));
        // No wrap at 24 hours.
        assert_eq!(adjust_departure_time("23:59:00", 120), Some("24:01:00".to_string()));
        assert_eq!(adjust_departure_time("25:10:30", 60), Some("25:11:00".to_string()));
    }

    #[test]
    fn seconds_component_always_zeroed() {
        assert_eq!(adjust_departure_time("09:00:45", 0), Some("09:00:00".to_string()));
    }

    #[test]
    fn unparseable_time_is_reported_not_swallowed() {
        assert_eq!(adjust_departure_time("09:00", 0), None);
        assert_eq!(adjust_departure_time("garbage", 0), None);

        let schedule = make_schedule(vec![scheduled("T1", "not-a-time")]);
        let err = combine(&schedule, &HashMap::new(), "00:00:00").unwrap_err();
        assert!(matches!(err, MergeError::BadScheduledTime(_)));
    }

    #[test]
    fn empty_schedule_yields_empty_output() {
        let schedule = make_schedule(vec![]);
        assert!(combine(&schedule, &HashMap::new(), "08:00:00")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn combine_is_idempotent() {
        let schedule = make_schedule(vec![
            scheduled("T1", "09:00:00"),
            scheduled("T2", "09:05:00"),
        ]);
        let realtime: RealtimeMap = [(
            "T1".to_string(),
            update(120, VehicleStatus::InTransit, Some(1_700_000_000)),
        )]
        .into_iter()
        .collect();

        let first = combine(&schedule, &realtime, "08:00:00").unwrap();
        let second = combine(&schedule, &realtime, "08:00:00").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn post_midnight_trip_compares_lexicographically() {
        // Documented limitation: a trip at "25:10:30" sorts after everything,
        // and an early-morning `now` keeps it even though it belongs to the
        // previous service day.
        let schedule = make_schedule(vec![
            scheduled("T1", "25:10:30"),
            scheduled("T2", "06:00:00"),
        ]);
        let result = combine(&schedule, &HashMap::new(), "05:00:00").unwrap();
        let times: Vec<&str> = result.iter().map(|d| d.scheduled_time.as_str()).collect();
        assert_eq!(times, vec!["06:00:00", "25:10:30"]);
    }

    #[test]
    fn observed_at_formats_as_iso8601() {
        let schedule = make_schedule(vec![scheduled("T1", "09:00:00")]);
        let realtime: RealtimeMap = [(
            "T1".to_string(),
            update(0, VehicleStatus::StoppedAt, Some(1_672_531_200)),
        )]
        .into_iter()
        .collect();

        let result = combine(&schedule, &realtime, "08:00:00").unwrap();
        assert_eq!(
            result[0].realtime.last_update.as_deref(),
            Some("2023-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn end_to_end_merge_scenario() {
        let schedule = make_schedule(vec![
            scheduled("T1", "09:00:00"),
            scheduled("T2", "09:05:00"),
        ]);
        let realtime: RealtimeMap = [(
            "T1".to_string(),
            update(120, VehicleStatus::InTransit, None),
        )]
        .into_iter()
        .collect();

        let result = combine(&schedule, &realtime, "08:00:00").unwrap();
        assert_eq!(result.len(), 2);

        assert_eq!(result[0].scheduled_time, "09:00:00");
        assert_eq!(result[0].departure_time, "09:02:00");
        assert_eq!(result[0].realtime.delay, 120);
        assert_eq!(result[0].realtime.status, VehicleStatus::InTransit);

        assert_eq!(result[1].scheduled_time, "09:05:00");
        assert_eq!(result[1].departure_time, "09:05:00");
        assert_eq!(result[1].realtime.delay, 0);
        assert_eq!(result[1].realtime.status, VehicleStatus::Scheduled);
    }

    #[test]
    fn combined_departure_json_shape() {
        let departure = CombinedDeparture {
            scheduled_time: "09:00:00".to_string(),
            departure_time: "09:02:00".to_string(),
            realtime: RealtimeInfo {
                delay: 120,
                status: VehicleStatus::InTransit,
                last_update: None,
            },
        };
        let json = serde_json::to_value(&departure).unwrap();
        assert_eq!(json["scheduled_time"], "09:00:00");
        assert_eq!(json["departure_time"], "09:02:00");
        assert_eq!(json["realtime"]["delay"], 120);
        assert_eq!(json["realtime"]["status"], "IN_TRANSIT");
        assert_eq!(json["realtime"]["lastUpdate"], serde_json::Value::Null);
    }
}
