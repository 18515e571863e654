use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::TargetStop;

use super::error::GtfsError;

/// Maximum allowed download size for the GTFS zip (500 MB)
const MAX_DOWNLOAD_SIZE: u64 = 500 * 1024 * 1024;
/// Maximum allowed total decompressed size for the GTFS zip (2 GB)
const MAX_DECOMPRESSED_SIZE: u64 = 2 * 1024 * 1024 * 1024;
/// Maximum length for cached HTTP header values (ETag, Last-Modified)
const MAX_HEADER_LENGTH: usize = 1024;

// --- Public types for the in-memory stop schedule ---

/// One scheduled call of the target stop, built from a stop_times.txt row.
/// There is one entry per trip for the service day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDeparture {
    pub trip_id: String,
    /// Raw stop_sequence text from the feed. Only consumed by the row
    /// filter; kept for diagnostics.
    pub stop_sequence: String,
    /// "HH:MM:SS" as written in the feed. May exceed 24:00:00 for
    /// post-midnight service and is never wrapped or reformatted.
    pub departure_time: String,
    pub arrival_time: String,
}

/// The per-stop schedule slice published to the data store. Replaced
/// wholesale on every static refresh.
#[derive(Debug, Clone)]
pub struct StopSchedule {
    pub route_id: String,
    pub route_name: String,
    /// In stop_times.txt file order; trip_ids are unique within one slice.
    pub departures: Vec<ScheduledDeparture>,
    pub loaded_at: DateTime<Utc>,
}

impl StopSchedule {
    /// Schedule with no departures, published when the static feed turned
    /// out to be structurally malformed.
    pub fn empty(target: &TargetStop) -> Self {
        Self {
            route_id: target.route_id.clone(),
            route_name: target
                .route_name
                .clone()
                .unwrap_or_else(|| target.route_id.clone()),
            departures: Vec::new(),
            loaded_at: Utc::now(),
        }
    }
}

// --- Download ---

/// Download the static GTFS feed to the cache directory.
///
/// Sends a conditional request using the ETag/Last-Modified values saved from
/// the previous download; a 304 keeps the cached zip.
pub async fn download_feed(
    client: &reqwest::Client,
    url: &str,
    cache_dir: &str,
) -> Result<PathBuf, GtfsError> {
    let cache_path = Path::new(cache_dir);
    tokio::fs::create_dir_all(cache_path).await?;

    let zip_path = cache_path.join("latest.zip");
    let metadata_path = cache_path.join("metadata.json");

    let mut request = client.get(url);
    if let Ok(meta_content) = tokio::fs::read_to_string(&metadata_path).await {
        if let Ok(meta) = serde_json::from_str::<serde_json::Value>(&meta_content) {
            if let Some(etag) = meta.get("etag").and_then(|v| v.as_str()) {
                request = request.header("If-None-Match", etag);
            }
            if let Some(last_modified) = meta.get("last_modified").and_then(|v| v.as_str()) {
                request = request.header("If-Modified-Since", last_modified);
            }
        }
    }

    let response = request
        .timeout(std::time::Duration::from_secs(600))
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
        info!("Static GTFS feed not modified, using cached version");
        return Ok(zip_path);
    }

    if !response.status().is_success() {
        return Err(GtfsError::NetworkMessage(format!(
            "GTFS download HTTP {}",
            response.status()
        )));
    }

    if let Some(content_length) = response.content_length() {
        if content_length > MAX_DOWNLOAD_SIZE {
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS download too large: {} bytes (max {} bytes)",
                content_length, MAX_DOWNLOAD_SIZE
            )));
        }
    }

    // Save validators for the next conditional request.
    let etag = response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .filter(|s| s.len() <= MAX_HEADER_LENGTH)
        .map(|s| s.to_string());
    let last_modified = response
        .headers()
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .filter(|s| s.len() <= MAX_HEADER_LENGTH)
        .map(|s| s.to_string());

    // Stream to disk with a hard size limit.
    let mut total_bytes: u64 = 0;
    let mut file = tokio::fs::File::create(&zip_path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total_bytes += chunk.len() as u64;
        if total_bytes > MAX_DOWNLOAD_SIZE {
            drop(file);
            let _ = tokio::fs::remove_file(&zip_path).await;
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS download exceeded size limit at {} bytes (max {} bytes)",
                total_bytes, MAX_DOWNLOAD_SIZE
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    info!(size_mb = total_bytes / (1024 * 1024), "Downloaded static GTFS feed");

    let meta = serde_json::json!({
        "etag": etag,
        "last_modified": last_modified,
        "downloaded_at": chrono::Utc::now().to_rfc3339(),
    });
    let _ = tokio::fs::write(&metadata_path, meta.to_string()).await;

    Ok(zip_path)
}

// --- Loading and extraction ---

/// Load the GTFS zip and slice out the target stop's schedule
/// (blocking — call on spawn_blocking).
pub fn load_stop_schedule(zip_path: &Path, target: &TargetStop) -> Result<StopSchedule, GtfsError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    // ZIP bomb protection: check total uncompressed size before parsing.
    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        if let Ok(entry) = archive.by_index(i) {
            total_uncompressed += entry.size();
        }
    }
    if total_uncompressed > MAX_DECOMPRESSED_SIZE {
        return Err(GtfsError::ParseError(format!(
            "GTFS zip decompressed size {} bytes exceeds limit {} bytes",
            total_uncompressed, MAX_DECOMPRESSED_SIZE
        )));
    }

    let departures = {
        let stop_times = archive.by_name("stop_times.txt")?;
        extract_stop_schedule(stop_times, target)?
    };
    info!(
        count = departures.len(),
        stop_id = %target.stop_id,
        "Extracted stop_times.txt rows for target stop"
    );

    // routes.txt lookup is best-effort; a config override wins.
    let route_name = target.route_name.clone().or_else(|| {
        let routes = archive.by_name("routes.txt").ok()?;
        resolve_route_name(routes, &target.route_id)
    });
    if route_name.is_none() {
        warn!(route_id = %target.route_id, "Route not found in routes.txt, using route_id as display name");
    }

    Ok(StopSchedule {
        route_id: target.route_id.clone(),
        route_name: route_name.unwrap_or_else(|| target.route_id.clone()),
        departures,
        loaded_at: Utc::now(),
    })
}

/// Filter the stop_times table down to the target stop.
///
/// stop_id and stop_sequence are compared as the raw CSV text. The feed
/// encodes both as text and any leading-zero semantics are unverified, so
/// numeric coercion before comparison would change which rows match.
pub fn extract_stop_schedule<R: Read>(
    reader: R,
    target: &TargetStop,
) -> Result<Vec<ScheduledDeparture>, GtfsError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GtfsError::ParseError(format!("stop_times.txt missing {}", name)))
    };
    let idx_trip = column("trip_id")?;
    let idx_stop = column("stop_id")?;
    let idx_seq = column("stop_sequence")?;
    let idx_dep = column("departure_time")?;
    let idx_arr = column("arrival_time")?;

    let mut departures = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.get(idx_stop) != Some(target.stop_id.as_str())
            || record.get(idx_seq) != Some(target.stop_sequence.as_str())
        {
            continue;
        }
        departures.push(ScheduledDeparture {
            trip_id: record.get(idx_trip).unwrap_or("").to_string(),
            stop_sequence: record.get(idx_seq).unwrap_or("").to_string(),
            departure_time: record.get(idx_dep).unwrap_or("").to_string(),
            arrival_time: record.get(idx_arr).unwrap_or("").to_string(),
        });
    }

    Ok(departures)
}

/// Look up the display name for a route in routes.txt.
fn resolve_route_name<R: Read>(reader: R, route_id: &str) -> Option<String> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().ok()?.clone();

    let idx_id = headers.iter().position(|h| h == "route_id")?;
    let idx_long = headers.iter().position(|h| h == "route_long_name");
    let idx_short = headers.iter().position(|h| h == "route_short_name");

    for result in rdr.records() {
        let Ok(record) = result else {
            continue;
        };
        if record.get(idx_id) != Some(route_id) {
            continue;
        }
        let name = idx_long
            .and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .or_else(|| {
                idx_short
                    .and_then(|i| record.get(i))
                    .filter(|s| !s.is_empty())
            });
        return name.map(|s| s.to_string());
    }
    None
}
