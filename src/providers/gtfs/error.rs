use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Network error: {0}")]
    NetworkMessage(String),
    #[error("GTFS parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Protobuf decode error: {0}")]
    ProtobufError(#[from] prost::DecodeError),
    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl GtfsError {
    /// True when the feed content itself was malformed, as opposed to a
    /// failure fetching or unpacking it. The refresh boundary uses this to
    /// decide between keeping the previous slot value (ingestion failure)
    /// and publishing an empty result (malformed data).
    pub fn is_malformed_data(&self) -> bool {
        matches!(self, GtfsError::ParseError(_) | GtfsError::CsvError(_))
    }
}
