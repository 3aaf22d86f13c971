//! Client for the zone service's REST API.
//!
//! Deliberately thin: every call returns the status code and parsed JSON body
//! as data, with no status checking baked in. Scenarios assert on responses
//! themselves, because a 4xx that would be an error in production code is the
//! expected observation in half of these tests (quota rejections, lookups of
//! deleted zones).

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use crate::poll::{PollOutcome, Poller};

/// Status code plus parsed body of one API call. Bodies that are not JSON
/// (empty 204s, proxy error pages) parse as `Value::Null`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The zone's propagation status (`PENDING`, `ACTIVE`, `ERROR`).
    pub fn zone_status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.body.get("name").and_then(Value::as_str)
    }

    /// Error payload fields, present on rejection responses.
    pub fn code(&self) -> Option<i64> {
        self.body.get("code").and_then(Value::as_i64)
    }

    pub fn error_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// Status line plus pretty-printed body for assertion messages, truncated
    /// so a huge zone list cannot drown the failure that cites it.
    pub fn summary(&self) -> String {
        let body = serde_json::to_string_pretty(&self.body).unwrap_or_default();
        let body = if body.len() > 1000 {
            // back off to a char boundary; bodies can carry multi-byte UTF-8
            let mut end = 1000;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body
        };
        format!("HTTP {}\n{}", self.status, body)
    }
}

/// HTTP client bound to one deployment's API endpoint.
#[derive(Debug, Clone)]
pub struct ZoneApi {
    base_url: String,
    http: reqwest::Client,
}

impl ZoneApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_zones(&self) -> Result<ApiResponse, reqwest::Error> {
        self.get("/v2/zones").await
    }

    pub async fn create_zone(
        &self,
        name: &str,
        email: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        self.post("/v2/zones", &json!({ "name": name, "email": email }))
            .await
    }

    pub async fn get_zone(&self, zone_id: &str) -> Result<ApiResponse, reqwest::Error> {
        self.get(&format!("/v2/zones/{zone_id}")).await
    }

    pub async fn delete_zone(&self, zone_id: &str) -> Result<ApiResponse, reqwest::Error> {
        let url = format!("{}/v2/zones/{zone_id}", self.base_url);
        debug!(%url, "DELETE");
        let resp = self.http.delete(&url).send().await?;
        Self::capture(resp).await
    }

    pub async fn create_recordset(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
        records: &[&str],
    ) -> Result<ApiResponse, reqwest::Error> {
        self.post(
            &format!("/v2/zones/{zone_id}/recordsets"),
            &json!({ "name": name, "type": record_type, "records": records }),
        )
        .await
    }

    async fn get(&self, path: &str) -> Result<ApiResponse, reqwest::Error> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "GET");
        let resp = self.http.get(&url).send().await?;
        Self::capture(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, reqwest::Error> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "POST");
        let resp = self.http.post(&url).json(body).send().await?;
        Self::capture(resp).await
    }

    async fn capture(resp: reqwest::Response) -> Result<ApiResponse, reqwest::Error> {
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(ApiResponse { status, body })
    }
}

/// Poll a zone until its status lands in `statuses` or the API stops
/// answering success. Stopping on the first non-2xx response keeps a dead
/// zone (410, 404) from burning the whole deadline.
pub async fn wait_for_status(
    api: &ZoneApi,
    zone_id: &str,
    statuses: &[&str],
    poller: &Poller,
) -> PollOutcome<ApiResponse, reqwest::Error> {
    poller
        .run(
            || api.get_zone(zone_id),
            |resp| {
                !resp.is_success()
                    || resp
                        .zone_status()
                        .is_some_and(|s| statuses.contains(&s))
            },
        )
        .await
}

/// Poll until the zone answers 404.
pub async fn wait_for_gone(
    api: &ZoneApi,
    zone_id: &str,
    poller: &Poller,
) -> PollOutcome<ApiResponse, reqwest::Error> {
    poller
        .run(|| api.get_zone(zone_id), |resp| resp.status == 404)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, body: Value) -> ApiResponse {
        ApiResponse { status, body }
    }

    #[test]
    fn success_covers_the_2xx_range_only() {
        assert!(resp(200, Value::Null).is_success());
        assert!(resp(202, Value::Null).is_success());
        assert!(!resp(199, Value::Null).is_success());
        assert!(!resp(404, Value::Null).is_success());
        assert!(!resp(413, Value::Null).is_success());
    }

    #[test]
    fn zone_fields_come_from_the_body() {
        let r = resp(
            202,
            json!({
                "id": "8db93d1c-7b85-41e2-92a8-f2b0a10b1b16",
                "name": "test-abc123.example.com.",
                "status": "PENDING"
            }),
        );
        assert_eq!(r.id(), Some("8db93d1c-7b85-41e2-92a8-f2b0a10b1b16"));
        assert_eq!(r.name(), Some("test-abc123.example.com."));
        assert_eq!(r.zone_status(), Some("PENDING"));
        assert_eq!(r.code(), None);
    }

    #[test]
    fn rejection_fields_come_from_the_error_payload() {
        let r = resp(
            413,
            json!({ "code": 413, "type": "over_quota", "message": "Quota exceeded" }),
        );
        assert_eq!(r.code(), Some(413));
        assert_eq!(r.error_type(), Some("over_quota"));
        assert_eq!(r.zone_status(), None);
    }

    #[test]
    fn missing_fields_are_none_not_panics() {
        let r = resp(204, Value::Null);
        assert_eq!(r.id(), None);
        assert_eq!(r.name(), None);
        assert_eq!(r.zone_status(), None);
        assert_eq!(r.error_type(), None);
    }

    #[test]
    fn summary_includes_status_and_truncates_large_bodies() {
        let r = resp(500, json!({ "message": "x".repeat(5000) }));
        let s = r.summary();
        assert!(s.starts_with("HTTP 500"));
        assert!(s.ends_with("..."));
        assert!(s.len() < 1100);
    }

    #[test]
    fn summary_truncates_multibyte_bodies_without_panicking() {
        // sized so the truncation point lands inside a two-byte character
        let r = resp(500, json!({ "message": format!("a{}", "é".repeat(600)) }));
        let s = r.summary();
        assert!(s.starts_with("HTTP 500"));
        assert!(s.ends_with("..."));
        assert!(s.len() < 1100);
    }
}
