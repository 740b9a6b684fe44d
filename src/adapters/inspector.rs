//! Inspector dashboard: token-gated access to captured exchanges.
//!
//! Host-scoped on a well-known path. Authentication compares a presented
//! token against the hostname's provisioned password in constant time; the
//! token may arrive as a POST form field, a query parameter, a Bearer token,
//! or the password segment of Basic credentials, in that precedence order.
//! POST requests carry an `action` (`prune` or `replay`); both fall through
//! to the recent-logs view afterwards. HTML rendering is an external
//! concern; the view here is the JSON the dashboard is built from.
use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use subtle::ConstantTimeEq;

use crate::{
    adapters::http_handler::{resolve_hostname, text_response},
    config::models::InspectorConfig,
    core::replay::ReplayEngine,
    ports::{credential_store::CredentialStore, log_store::LogStore},
};

/// Form/query parameter map.
type Params = HashMap<String, String>;

pub struct Inspector {
    store: Arc<dyn LogStore>,
    credentials: Arc<dyn CredentialStore>,
    replay: Arc<ReplayEngine>,
    config: InspectorConfig,
}

impl Inspector {
    pub fn new(
        store: Arc<dyn LogStore>,
        credentials: Arc<dyn CredentialStore>,
        replay: Arc<ReplayEngine>,
        config: InspectorConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            replay,
            config,
        }
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Response<Body> {
        let hostname = match resolve_hostname(&req) {
            Ok(hostname) => hostname,
            Err(response) => return response,
        };

        let method = req.method().clone();
        if method != Method::GET && method != Method::POST {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "GET or POST only".into());
        }

        let query: Params = req
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        let headers = req.headers().clone();

        let form: Option<Params> = if method == Method::POST {
            match axum::body::to_bytes(req.into_body(), 64 * 1024).await {
                Ok(bytes) => serde_urlencoded::from_bytes(&bytes).ok(),
                Err(_) => None,
            }
        } else {
            None
        };

        // Gate first: nothing below runs without a matching credential.
        let stored = match self.credentials.get(&hostname).await {
            Ok(Some(password)) => password,
            Ok(None) => {
                return text_response(
                    StatusCode::NOT_FOUND,
                    format!(
                        "no inspector credential is provisioned for {hostname}; \
                         provision one to enable the dashboard"
                    ),
                );
            }
            Err(err) => {
                tracing::error!(hostname = %hostname, error = %err, "credential lookup failed");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "store failure".into());
            }
        };

        let presented = extract_token(form.as_ref(), &query, &headers);
        if !token_matches(presented.as_deref(), &stored) {
            return text_response(StatusCode::UNAUTHORIZED, "unauthorized".into());
        }

        // Authenticated: run the requested action, then render the view.
        let flash = if method == Method::POST {
            match &form {
                Some(form) => self.run_action(&hostname, form).await,
                None => Some("Malformed form submission".to_string()),
            }
        } else {
            None
        };

        self.render_logs(&hostname, &query, flash).await
    }

    async fn run_action(&self, hostname: &str, form: &Params) -> Option<String> {
        match form.get("action").map(String::as_str) {
            Some("prune") => match self.store.delete_by_hostname(hostname).await {
                Ok(removed) => Some(format!("Pruned {removed} log entries")),
                Err(err) => {
                    tracing::error!(hostname, error = %err, "prune failed");
                    Some("Prune failed".to_string())
                }
            },
            Some("replay") => {
                let Some(log_id) = form.get("logId").and_then(|id| id.parse::<i64>().ok()) else {
                    return Some("Replay requires a logId".to_string());
                };
                match self.replay.replay(log_id, hostname).await {
                    Ok(summary) => Some(summary.to_string()),
                    Err(err) => Some(format!("Replay failed: {err}")),
                }
            }
            Some(other) => Some(format!("Unknown action {other:?}")),
            None => Some("Missing action".to_string()),
        }
    }

    /// Recent-logs view, newest first, capped at `min(limit, max_limit)`.
    async fn render_logs(
        &self,
        hostname: &str,
        query: &Params,
        flash: Option<String>,
    ) -> Response<Body> {
        let limit = query
            .get("limit")
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        let logs = match self.store.find_recent_by_hostname(hostname, limit).await {
            Ok(logs) => logs,
            Err(err) => {
                tracing::error!(hostname, error = %err, "log listing failed");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "store failure".into());
            }
        };

        let view = serde_json::json!({
            "hostname": hostname,
            "flash": flash,
            "logs": logs,
        });
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(view.to_string()))
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }
}

/// Presented-token precedence: form `token` (POST only), query `token`,
/// `Authorization: Bearer`, `Authorization: Basic` (password segment).
fn extract_token(
    form: Option<&Params>,
    query: &Params,
    headers: &axum::http::HeaderMap,
) -> Option<String> {
    if let Some(token) = form.and_then(|f| f.get("token")) {
        return Some(token.clone());
    }
    if let Some(token) = query.get("token") {
        return Some(token.clone());
    }
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;
    if let Some(bearer) = authorization.strip_prefix("Bearer ") {
        return Some(bearer.trim().to_string());
    }
    if let Some(basic) = authorization.strip_prefix("Basic ") {
        let decoded = BASE64_STANDARD.decode(basic.trim().as_bytes()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;
        let (_user, password) = credentials.split_once(':')?;
        return Some(password.to_string());
    }
    None
}

/// Constant-time comparison of the presented token against the stored
/// password. Absence never matches.
fn token_matches(presented: Option<&str>, stored: &str) -> bool {
    match presented {
        Some(token) => bool::from(token.as_bytes().ct_eq(stored.as_bytes())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn form_token_wins_over_query_and_headers() {
        let form = params(&[("token", "from-form")]);
        let query = params(&[("token", "from-query")]);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-bearer"),
        );

        assert_eq!(
            extract_token(Some(&form), &query, &headers).as_deref(),
            Some("from-form")
        );
        assert_eq!(
            extract_token(None, &query, &headers).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            extract_token(None, &Params::new(), &headers).as_deref(),
            Some("from-bearer")
        );
    }

    #[test]
    fn basic_credentials_use_the_password_segment() {
        let mut headers = HeaderMap::new();
        let encoded = BASE64_STANDARD.encode(b"u:s3cret");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        assert_eq!(
            extract_token(None, &Params::new(), &headers).as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn password_containing_colon_survives_basic_split() {
        let mut headers = HeaderMap::new();
        let encoded = BASE64_STANDARD.encode(b"u:pa:ss");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        assert_eq!(
            extract_token(None, &Params::new(), &headers).as_deref(),
            Some("pa:ss")
        );
    }

    #[test]
    fn token_comparison_rejects_absence_and_mismatch() {
        assert!(token_matches(Some("s3cret"), "s3cret"));
        assert!(!token_matches(Some("wrong"), "s3cret"));
        assert!(!token_matches(Some(""), "s3cret"));
        assert!(!token_matches(None, "s3cret"));
    }
}
