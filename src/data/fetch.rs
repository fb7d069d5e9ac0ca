//! Upstream CSV retrieval.
//!
//! Locations are either `http(s)://` URLs or local paths (optionally written
//! as `file://` URLs). Whatever the transport, the body must *look like* CSV:
//! a login page or JSON error served with a CSV content type is still
//! rejected, because it would otherwise ingest as an empty table.
//!
//! Failed attempts are retried with a linearly increasing delay; exhausting
//! the attempts fails only the source being fetched.

use std::path::Path;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::RetryPolicy;
use crate::error::AppError;

/// Structured fetch failures.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {location}")]
    Status { status: u16, location: String },

    #[error("unexpected content-type={content_type:?}; head={head:?}")]
    UnexpectedContent { content_type: String, head: String },

    #[error("response format changed: {0}")]
    Format(String),

    #[error("failed to read {location}: {message}")]
    Read { location: String, message: String },

    #[error("fetch fail after {attempts} attempt(s): {last} url={location}")]
    Exhausted {
        attempts: u32,
        location: String,
        last: Box<FetchError>,
    },
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::runtime(err.to_string())
    }
}

/// A raw response before content validation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub content_type: String,
    pub body: String,
}

/// Something that can produce CSV text for a location.
pub trait CsvSource: Sync {
    /// One attempt at retrieving `location`, without validation or retry.
    fn get(&self, location: &str) -> Result<RawResponse, FetchError>;
}

/// HTTP(S) via reqwest, local files from disk.
pub struct HttpCsvSource {
    client: Client,
}

impl HttpCsvSource {
    pub fn new(policy: &RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| AppError::runtime(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl CsvSource for HttpCsvSource {
    fn get(&self, location: &str) -> Result<RawResponse, FetchError> {
        if !is_remote(location) {
            return read_local(location);
        }

        let resp = self
            .client
            .get(location)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                location: location.to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = resp.text().map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(RawResponse { content_type, body })
    }
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn read_local(location: &str) -> Result<RawResponse, FetchError> {
    let path = location.strip_prefix("file://").unwrap_or(location);
    let body = std::fs::read_to_string(Path::new(path)).map_err(|e| FetchError::Read {
        location: location.to_string(),
        message: e.to_string(),
    })?;
    let content_type = if path.to_ascii_lowercase().ends_with(".csv") {
        "text/csv".to_string()
    } else {
        String::new()
    };
    Ok(RawResponse { content_type, body })
}

/// Accept a response only if its body resembles CSV.
pub fn validate_csv(resp: RawResponse) -> Result<String, FetchError> {
    let ct = resp.content_type.to_ascii_lowercase();
    let trimmed = resp.body.trim_start_matches('\u{feff}').trim_start();
    let header = trimmed.lines().next().unwrap_or("").trim();

    let looks_like_markup = trimmed.starts_with('<') || trimmed.starts_with('{') || trimmed.starts_with('[');
    let date_header = header.to_ascii_lowercase().starts_with("date,");
    let declared_csv = ct.contains("text/csv") && header.contains(',');

    if !header.is_empty() && !looks_like_markup && (date_header || declared_csv) {
        return Ok(resp.body);
    }

    Err(FetchError::UnexpectedContent {
        content_type: ct,
        head: trimmed.chars().take(60).collect(),
    })
}

/// Fetch and validate CSV text, retrying per `policy`.
pub fn fetch_csv(source: &dyn CsvSource, location: &str, policy: &RetryPolicy) -> Result<String, FetchError> {
    let attempts = policy.attempts.max(1);
    let mut last = None;

    for attempt in 0..attempts {
        match source.get(location).and_then(validate_csv) {
            Ok(text) => {
                debug!(location, attempt, bytes = text.len(), "fetched CSV");
                return Ok(text);
            }
            Err(err) => {
                warn!(location, attempt = attempt + 1, of = attempts, error = %err, "fetch attempt failed");
                last = Some(err);
            }
        }
        if attempt + 1 < attempts {
            std::thread::sleep(policy.delay_after(attempt));
        }
    }

    Err(FetchError::Exhausted {
        attempts,
        location: location.to_string(),
        last: Box::new(last.unwrap_or_else(|| FetchError::Network("no attempt made".into()))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn resp(ct: &str, body: &str) -> RawResponse {
        RawResponse {
            content_type: ct.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn sniffing_accepts_date_header_regardless_of_content_type() {
        assert!(validate_csv(resp("text/plain", "Date,Close\n2024-01-02,1\n")).is_ok());
        assert!(validate_csv(resp("", "\n  date,HSI\n")).is_ok());
    }

    #[test]
    fn sniffing_accepts_declared_csv_with_other_first_column() {
        assert!(validate_csv(resp("text/csv; charset=utf-8", "日期,Close\n2024-01-02,1\n")).is_ok());
    }

    #[test]
    fn sniffing_rejects_markup_even_when_declared_csv() {
        let err = validate_csv(resp("text/csv", "<!DOCTYPE html><html>login</html>")).unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedContent { .. }));
        assert!(validate_csv(resp("text/csv", "{\"error\":\"nope\"}")).is_err());
        assert!(validate_csv(resp("text/html", "Symbol,Close\n")).is_err());
        assert!(validate_csv(resp("text/csv", "")).is_err());
    }

    struct Scripted {
        responses: Mutex<Vec<Result<RawResponse, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl CsvSource for Scripted {
        fn get(&self, _location: &str) -> Result<RawResponse, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn retries_until_valid_content() {
        let source = Scripted {
            responses: Mutex::new(vec![
                Err(FetchError::Network("reset".into())),
                Ok(resp("text/html", "<html>")),
                Ok(resp("text/csv", "Date,Close\n")),
            ]),
            calls: Mutex::new(0),
        };
        let text = fetch_csv(&source, "https://x", &fast_policy(3)).unwrap();
        assert_eq!(text, "Date,Close\n");
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }

    #[test]
    fn exhausted_reports_last_error() {
        let source = Scripted {
            responses: Mutex::new(vec![
                Err(FetchError::Network("reset".into())),
                Err(FetchError::Status {
                    status: 503,
                    location: "https://x".into(),
                }),
            ]),
            calls: Mutex::new(0),
        };
        let err = fetch_csv(&source, "https://x", &fast_policy(2)).unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn local_files_are_read_and_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "Date,HSI\n2024-01-02,1\n").unwrap();
        let source = HttpCsvSource::new(&fast_policy(1)).unwrap();
        let location = format!("file://{}", path.display());
        let text = fetch_csv(&source, &location, &fast_policy(1)).unwrap();
        assert!(text.starts_with("Date,HSI"));
    }
}
