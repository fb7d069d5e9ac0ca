//! Daily close history for one Hong Kong listed symbol (Yahoo v8 chart API).
//!
//! Codes use the broker notation `HK.00700`; the chart symbol drops the
//! market prefix and appends the exchange suffix (`00700.HK`).

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::fetch::FetchError;
use crate::domain::RetryPolicy;
use crate::error::AppError;

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// One daily close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub close: f64,
}

/// Something that can return a symbol's recent daily closes.
pub trait HistoryProvider {
    fn fetch_history(&self, code: &str, days: u32) -> Result<Vec<HistoryRow>, FetchError>;
}

pub struct YahooHistory {
    client: Client,
    retry: RetryPolicy,
}

impl YahooHistory {
    pub fn new(retry: RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(retry.timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
            .build()
            .map_err(|e| AppError::runtime(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<HistoryRow>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                location: url.to_string(),
            });
        }
        let chart: ChartResponse = resp
            .json()
            .map_err(|e| FetchError::Format(format!("failed to parse chart response: {e}")))?;
        parse_chart(chart)
    }
}

impl HistoryProvider for YahooHistory {
    fn fetch_history(&self, code: &str, days: u32) -> Result<Vec<HistoryRow>, FetchError> {
        let url = chart_url(code, days);
        let attempts = self.retry.attempts.max(1);
        let mut last = None;

        for attempt in 0..attempts {
            match self.fetch_once(&url) {
                Ok(rows) => return Ok(rows),
                // A changed payload will not fix itself on retry.
                Err(err @ FetchError::Format(_)) => return Err(err),
                Err(err) => {
                    warn!(code, attempt = attempt + 1, of = attempts, error = %err, "history fetch failed");
                    last = Some(err);
                }
            }
            if attempt + 1 < attempts {
                std::thread::sleep(self.retry.delay_after(attempt));
            }
        }

        Err(FetchError::Exhausted {
            attempts,
            location: url,
            last: Box::new(last.unwrap_or_else(|| FetchError::Network("no attempt made".into()))),
        })
    }
}

/// `HK.00700` -> `00700.HK`.
pub fn chart_symbol(code: &str) -> String {
    format!("{}.HK", code.trim().replace("HK.", ""))
}

pub fn chart_url(code: &str, days: u32) -> String {
    format!("{BASE_URL}/{}?range={days}d&interval=1d", chart_symbol(code))
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Vec<Option<f64>>,
}

/// Extract `(date, close)` rows; null closes are skipped.
pub fn parse_chart(resp: ChartResponse) -> Result<Vec<HistoryRow>, FetchError> {
    let result = match (resp.chart.result, resp.chart.error) {
        (Some(result), _) => result,
        (None, Some(err)) => return Err(FetchError::Format(format!("{}: {}", err.code, err.description))),
        (None, None) => return Err(FetchError::Format("empty result with no error".into())),
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Format("result array is empty".into()))?;
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Format("no quote data".into()))?;

    let mut rows = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.iter().zip(quote.close) {
        let Some(close) = close else { continue };
        let date = DateTime::from_timestamp(*ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| FetchError::Format(format!("invalid timestamp: {ts}")))?;
        rows.push(HistoryRow { date, close });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_mapping() {
        assert_eq!(chart_symbol("HK.00700"), "00700.HK");
        assert_eq!(chart_symbol("0005"), "0005.HK");
        assert_eq!(
            chart_url("HK.00700", 365),
            "https://query1.finance.yahoo.com/v8/finance/chart/00700.HK?range=365d&interval=1d"
        );
    }

    #[test]
    fn parses_rows_and_skips_null_closes() {
        let json = r#"{"chart":{"result":[{"timestamp":[1704157200,1704243600,1704330000],
            "indicators":{"quote":[{"close":[290.5,null,292.0]}]}}],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        let rows = parse_chart(resp).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[1].close, 292.0);
    }

    #[test]
    fn chart_error_is_format_error() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        let err = parse_chart(resp).unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }
}
