use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Window length named by unit (config values: "second", "minute", "hour", "day").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl Default for WindowUnit {
    fn default() -> Self {
        WindowUnit::Second
    }
}

impl WindowUnit {
    pub fn duration(self) -> Duration {
        match self {
            WindowUnit::Second => Duration::from_secs(1),
            WindowUnit::Minute => Duration::from_secs(60),
            WindowUnit::Hour => Duration::from_secs(60 * 60),
            WindowUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Pretty labels for logs
pub fn unit_label(u: WindowUnit) -> &'static str {
    match u {
        WindowUnit::Second => "second",
        WindowUnit::Minute => "minute",
        WindowUnit::Hour => "hour",
        WindowUnit::Day => "day",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// 2xx from the API
    Accepted,
    /// any other status; the body is kept verbatim in the record
    Rejected,
    SerializationFailed,
    SigningFailed,
    GateClosed,
    TransportFailed,
}

impl Outcome {
    pub fn from_error(e: &Error) -> Self {
        match e {
            Error::Serialization(_) => Outcome::SerializationFailed,
            Error::Signing(_) => Outcome::SigningFailed,
            Error::Closed | Error::TimedOut | Error::Configuration(_) => Outcome::GateClosed,
            Error::Transport(_) | Error::Disconnected => Outcome::TransportFailed,
        }
    }
}

/// One line of the results file.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub doc_id: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// gate window the request was counted against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<u64>,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
