use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::config::SyncConfig;

/// Tables the hosted backend is expected to carry.
pub const SYNC_TABLES: [&str; 5] = [
    "classes",
    "students",
    "attendance",
    "test_scores",
    "casas_scores",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub configured: bool,
    pub connected: bool,
    pub tables: Vec<TableStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncStatus {
    pub fn not_configured() -> Self {
        Self {
            configured: false,
            connected: false,
            tables: Vec::new(),
            error: None,
        }
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self {
            configured: true,
            connected: false,
            tables: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Connectivity check against the cloud backend. Implementations never fail;
/// problems are reported inside the status.
pub trait SyncProbe {
    fn probe(&self) -> SyncStatus;
}

pub struct UnconfiguredProbe;

impl SyncProbe for UnconfiguredProbe {
    fn probe(&self) -> SyncStatus {
        SyncStatus::not_configured()
    }
}

/// PostgREST-style backend (`{url}/rest/v1/{table}`).
pub struct RestProbe {
    base_url: String,
    client: Client,
}

enum TableOutcome {
    Found(Option<u64>),
    Missing,
    Rejected(StatusCode),
}

impl RestProbe {
    pub fn new(cfg: &SyncConfig, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&cfg.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))?,
        );
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn probe_table(&self, table: &str) -> Result<TableOutcome, reqwest::Error> {
        let url = format!("{}/rest/v1/{}?select=id&limit=1", self.base_url, table);
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if status.is_success() {
            let count = resp
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);
            return Ok(TableOutcome::Found(count));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(TableOutcome::Missing);
        }
        Ok(TableOutcome::Rejected(status))
    }
}

impl SyncProbe for RestProbe {
    fn probe(&self) -> SyncStatus {
        let mut tables = Vec::with_capacity(SYNC_TABLES.len());
        for name in SYNC_TABLES {
            let outcome = match self.probe_table(name) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(table = name, error = %e, "sync probe request failed");
                    return SyncStatus::not_connected(e.to_string());
                }
            };
            let status = match outcome {
                TableOutcome::Found(row_count) => TableStatus {
                    name: name.to_string(),
                    exists: true,
                    row_count,
                },
                TableOutcome::Missing => TableStatus {
                    name: name.to_string(),
                    exists: false,
                    row_count: None,
                },
                TableOutcome::Rejected(code)
                    if code == StatusCode::UNAUTHORIZED || code == StatusCode::FORBIDDEN =>
                {
                    return SyncStatus::not_connected(format!(
                        "backend rejected credentials ({})",
                        code.as_u16()
                    ));
                }
                TableOutcome::Rejected(code) => {
                    tracing::debug!(table = name, status = code.as_u16(), "table probe rejected");
                    TableStatus {
                        name: name.to_string(),
                        exists: false,
                        row_count: None,
                    }
                }
            };
            tables.push(status);
        }
        SyncStatus {
            configured: true,
            connected: true,
            tables,
            error: None,
        }
    }
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
pub fn parse_content_range(raw: &str) -> Option<u64> {
    let (_, total) = raw.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

pub fn probe_from_config(cfg: Option<&SyncConfig>, timeout: Duration) -> Box<dyn SyncProbe> {
    let Some(cfg) = cfg else {
        return Box::new(UnconfiguredProbe);
    };
    match RestProbe::new(cfg, timeout) {
        Ok(p) => Box::new(p),
        Err(e) => {
            tracing::warn!(error = %e, "sync backend configuration rejected; probe disabled");
            Box::new(UnconfiguredProbe)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range("0-0/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn unconfigured_probe_reports_not_connected() {
        let status = probe_from_config(None, Duration::from_secs(1)).probe();
        assert!(!status.configured);
        assert!(!status.connected);
        assert!(status.tables.is_empty());
    }

    #[test]
    fn unreachable_backend_is_normalized() {
        let cfg = SyncConfig {
            // Port 9 on localhost: connection refused, no DNS involved.
            url: "http://127.0.0.1:9".to_string(),
            api_key: "anon".to_string(),
        };
        let probe = RestProbe::new(&cfg, Duration::from_secs(2)).expect("client");
        let status = probe.probe();
        assert!(status.configured);
        assert!(!status.connected);
        assert!(status.error.is_some());
    }
}
