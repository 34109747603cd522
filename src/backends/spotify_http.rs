//! Spotify Web API transport backed by `ureq`.

use std::time::Duration;

use serde_json::Value;

use crate::backends::{CatalogTransport, TokenEndpoint, TokenGrant};
use crate::config::CatalogConfig;
use crate::error::{EnrichError, Result};

/// Blocking HTTP client for the accounts (token) and Web API hosts.
#[derive(Clone)]
pub struct SpotifyHttp {
    http_client: ureq::Agent,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    api_base_url: String,
}

impl SpotifyHttp {
    pub fn new(config: &CatalogConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            http_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: config.token_url.trim().to_string(),
            api_base_url: config.api_base_url.trim().to_string(),
        }
    }

    fn api_url(base: &str, endpoint: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn describe_ureq_failure(context: &str, error: ureq::Error) -> String {
        match error {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                let detail = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|payload| Self::error_message(&payload))
                    .unwrap_or_default();
                if detail.is_empty() {
                    format!("{context} returned HTTP {code}")
                } else {
                    format!("{context} returned HTTP {code}: {detail}")
                }
            }
            ureq::Error::Transport(transport) => format!("{context} transport error: {transport}"),
        }
    }

    /// Pulls a readable message out of either OAuth (`error_description`) or
    /// Web API (`error.message`) error bodies.
    fn error_message(payload: &Value) -> Option<String> {
        payload
            .get("error_description")
            .and_then(Value::as_str)
            .or_else(|| {
                payload
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
            })
            .or_else(|| payload.get("error").and_then(Value::as_str))
            .map(ToOwned::to_owned)
    }

    fn post_token_form(&self, grant_label: &str, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http_client
            .post(&self.token_url)
            .send_form(form)
            .map_err(|err| {
                EnrichError::AuthExchange(Self::describe_ureq_failure(grant_label, err))
            })?;
        let payload: Value = response.into_json().map_err(|err| {
            EnrichError::AuthExchange(format!("{grant_label} response parse failed: {err}"))
        })?;
        Ok(TokenGrant::from_json(&payload))
    }
}

impl TokenEndpoint for SpotifyHttp {
    fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant> {
        self.post_token_form(
            "authorization code exchange",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ],
        )
    }

    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.post_token_form(
            "token refresh",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ],
        )
    }
}

impl CatalogTransport for SpotifyHttp {
    fn get_json(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        bearer_token: &str,
    ) -> Result<Value> {
        let url = Self::api_url(&self.api_base_url, endpoint);
        let mut request = self
            .http_client
            .get(&url)
            .set("Authorization", &format!("Bearer {bearer_token}"));
        for (key, value) in params {
            request = request.query(key, value);
        }
        let response = request
            .call()
            .map_err(|err| EnrichError::Request(Self::describe_ureq_failure(endpoint, err)))?;
        response.into_json().map_err(|err| {
            EnrichError::MalformedResponse(format!("{endpoint} response parse failed: {err}"))
        })
    }
}
