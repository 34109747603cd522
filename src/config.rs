//! Persistent enrichment configuration model and defaults.

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote catalog endpoints and client registration.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Credential persistence and expiry handling.
    pub auth: AuthConfig,
    #[serde(default)]
    /// Dataset layout, thresholds, and request pacing.
    pub pipeline: PipelineConfig,
}

/// Catalog service endpoints and OAuth2 client registration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Credential file location and expiry policy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_path")]
    pub token_path: String,
    /// Seconds before `expires_at` at which a token already counts as expired.
    #[serde(default)]
    pub expiry_margin_secs: u64,
    /// Lifetime applied when the token endpoint omits `expires_in`.
    #[serde(default = "default_token_lifetime_secs")]
    pub default_token_lifetime_secs: u64,
}

/// Dataset layout and enrichment run tuning.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_input_delimiter")]
    pub input_delimiter: char,
    #[serde(default = "default_output_delimiter")]
    pub output_delimiter: char,
    /// Groups played fewer times than this are dropped before any lookup.
    #[serde(default = "default_min_play_count")]
    pub min_play_count: u32,
    /// Minimum spacing between two outbound catalog requests.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_missing_tracks_path")]
    pub missing_tracks_path: String,
    #[serde(default = "default_artist_column")]
    pub artist_column: String,
    #[serde(default = "default_album_column")]
    pub album_column: String,
    #[serde(default = "default_track_column")]
    pub track_column: String,
    #[serde(default = "default_catalog_id_column")]
    pub catalog_id_column: String,
    #[serde(default = "default_play_count_column")]
    pub play_count_column: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            expiry_margin_secs: 0,
            default_token_lifetime_secs: default_token_lifetime_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_delimiter: default_input_delimiter(),
            output_delimiter: default_output_delimiter(),
            min_play_count: default_min_play_count(),
            request_interval_ms: default_request_interval_ms(),
            batch_size: default_batch_size(),
            output_path: default_output_path(),
            missing_tracks_path: default_missing_tracks_path(),
            artist_column: default_artist_column(),
            album_column: default_album_column(),
            track_column: default_track_column(),
            catalog_id_column: default_catalog_id_column(),
            play_count_column: default_play_count_column(),
        }
    }
}

/// Largest identifier batch the attribute endpoint accepts.
pub const MAX_ATTRIBUTE_BATCH: usize = 100;
const MAX_REQUEST_INTERVAL_MS: u64 = 60_000;
const MAX_EXPIRY_MARGIN_SECS: u64 = 3_600;

/// Clamps values that would make a run meaningless or violate the catalog limits.
pub fn sanitize_config(config: Config) -> Config {
    let mut config = config;
    config.pipeline.min_play_count = config.pipeline.min_play_count.max(1);
    config.pipeline.batch_size = config.pipeline.batch_size.clamp(1, MAX_ATTRIBUTE_BATCH);
    config.pipeline.request_interval_ms = config
        .pipeline
        .request_interval_ms
        .min(MAX_REQUEST_INTERVAL_MS);
    config.catalog.request_timeout_secs = config.catalog.request_timeout_secs.max(1);
    config.auth.expiry_margin_secs = config.auth.expiry_margin_secs.min(MAX_EXPIRY_MARGIN_SECS);
    if config.auth.default_token_lifetime_secs == 0 {
        config.auth.default_token_lifetime_secs = default_token_lifetime_secs();
    }
    config
}

/// Applies `HISTORY_ENRICHER_CLIENT_ID` / `HISTORY_ENRICHER_CLIENT_SECRET` overrides.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(client_id) = lookup("HISTORY_ENRICHER_CLIENT_ID").filter(|v| !v.is_empty()) {
        config.catalog.client_id = client_id;
    }
    if let Some(secret) = lookup("HISTORY_ENRICHER_CLIENT_SECRET").filter(|v| !v.is_empty()) {
        config.catalog.client_secret = secret;
    }
}

fn default_redirect_uri() -> String {
    "http://localhost/".to_string()
}

fn default_scope() -> String {
    "user-top-read".to_string()
}

fn default_authorize_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_token_path() -> String {
    "token.txt".to_string()
}

fn default_token_lifetime_secs() -> u64 {
    3600
}

fn default_input_delimiter() -> char {
    ';'
}

fn default_output_delimiter() -> char {
    ','
}

fn default_min_play_count() -> u32 {
    4
}

fn default_request_interval_ms() -> u64 {
    1_000
}

fn default_batch_size() -> usize {
    MAX_ATTRIBUTE_BATCH
}

fn default_output_path() -> String {
    "processed_songs.csv".to_string()
}

fn default_missing_tracks_path() -> String {
    "missing_tracks.csv".to_string()
}

fn default_artist_column() -> String {
    "Artist".to_string()
}

fn default_album_column() -> String {
    "Album".to_string()
}

fn default_track_column() -> String {
    "Track".to_string()
}

fn default_catalog_id_column() -> String {
    "Spotify_ID".to_string()
}

fn default_play_count_column() -> String {
    "Play Count".to_string()
}
