//! Catalog service transport abstractions and concrete implementations.

pub mod spotify_http;

use serde_json::Value;

use crate::error::Result;

/// Fields of a token endpoint response that the credential lifecycle uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    /// Reads a grant from a token endpoint JSON body. Missing or empty fields
    /// stay `None`; deciding whether that is fatal is up to the caller.
    pub fn from_json(payload: &Value) -> Self {
        let non_empty = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };
        let expires_in = payload.get("expires_in").and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
        });
        Self {
            access_token: non_empty("access_token"),
            refresh_token: non_empty("refresh_token"),
            expires_in,
        }
    }
}

/// OAuth2 token endpoint of the catalog service.
pub trait TokenEndpoint {
    fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant>;
    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Authenticated JSON GET against the catalog API.
pub trait CatalogTransport {
    /// Issues one GET for `endpoint` (relative to the API base) with `params` as
    /// the query string and `bearer_token` in the `Authorization` header.
    fn get_json(&self, endpoint: &str, params: &[(&str, &str)], bearer_token: &str)
        -> Result<Value>;
}
