mod auth;
mod backends;
mod catalog_client;
mod cli;
mod clock;
mod config;
mod config_persistence;
mod dataset;
mod enrichment;
mod error;

use std::path::Path;

use clap::Parser;
use log::{error, info};

use auth::authorize_uri::AuthorizeRequest;
use auth::{AuthManager, AuthSettings, BrowserConsent, CredentialLoad, TokenStore};
use backends::spotify_http::SpotifyHttp;
use catalog_client::CatalogClient;
use cli::{Command, RootArgs, RunArgs};
use clock::{Clock, SystemClock};
use config::{apply_env_overrides, sanitize_config, Config};
use config_persistence::{default_config_path, load_or_create_config};
use enrichment::{pacer_for_interval_ms, EnrichmentPipeline};
use error::{EnrichError, Result};

fn auth_settings(config: &Config) -> AuthSettings {
    let margin_secs = i64::try_from(config.auth.expiry_margin_secs).unwrap_or(i64::MAX);
    AuthSettings {
        authorize: AuthorizeRequest {
            authorize_url: config.catalog.authorize_url.clone(),
            client_id: config.catalog.client_id.clone(),
            redirect_uri: config.catalog.redirect_uri.clone(),
            scope: config.catalog.scope.clone(),
        },
        expiry_margin: chrono::Duration::seconds(margin_secs),
        default_lifetime_secs: config.auth.default_token_lifetime_secs,
    }
}

fn require_client_registration(config: &Config, config_path: &Path) -> Result<()> {
    if config.catalog.client_id.trim().is_empty() || config.catalog.client_secret.trim().is_empty()
    {
        return Err(EnrichError::Config(format!(
            "catalog client_id and client_secret must be set in {} or via \
             HISTORY_ENRICHER_CLIENT_ID / HISTORY_ENRICHER_CLIENT_SECRET",
            config_path.display()
        )));
    }
    Ok(())
}

fn run_enrichment(config: &Config, config_path: &Path, run_args: &RunArgs) -> Result<()> {
    require_client_registration(config, config_path)?;
    let http = SpotifyHttp::new(&config.catalog);
    let mut auth = AuthManager::new(
        TokenStore::new(&config.auth.token_path),
        Box::new(http.clone()),
        Box::new(BrowserConsent::stdio()),
        Box::new(SystemClock),
        auth_settings(config),
    )?;
    let mut catalog = CatalogClient::new(&mut auth, &http);
    let mut pipeline = EnrichmentPipeline::new(
        config.pipeline.clone(),
        pacer_for_interval_ms(config.pipeline.request_interval_ms),
    );
    let summary = pipeline.run(&mut catalog, &run_args.input)?;
    info!(
        "Run finished: tracks={} lookups={} unresolved={} batches={} missing={}",
        summary.tracks,
        summary.lookups,
        summary.unresolved,
        summary.attribute_batches,
        summary.missing_attributes
    );
    Ok(())
}

fn login(config: &Config, config_path: &Path) -> Result<()> {
    require_client_registration(config, config_path)?;
    let http = SpotifyHttp::new(&config.catalog);
    let manager = AuthManager::login(
        TokenStore::new(&config.auth.token_path),
        Box::new(http),
        Box::new(BrowserConsent::stdio()),
        Box::new(SystemClock),
        auth_settings(config),
    )?;
    if let Some(credential) = manager.credential() {
        info!(
            "Login complete; token stored in {} (valid until {})",
            config.auth.token_path, credential.expires_at
        );
    }
    Ok(())
}

fn report_token_status(config: &Config) {
    let store = TokenStore::new(&config.auth.token_path);
    let settings = auth_settings(config);
    match store.load() {
        CredentialLoad::Present(credential) => {
            let refresh = if credential.refresh_token.is_some() {
                "present"
            } else {
                "absent"
            };
            if credential.is_expired_at(SystemClock.now(), settings.expiry_margin) {
                info!(
                    "Stored token expired at {} (refresh token {refresh})",
                    credential.expires_at
                );
            } else {
                info!(
                    "Stored token valid until {} (refresh token {refresh})",
                    credential.expires_at
                );
            }
        }
        CredentialLoad::Absent(reason) => {
            info!("No usable stored token in {}: {reason}", config.auth.token_path);
        }
    }
}

fn run_command(args: RootArgs) -> Result<()> {
    let config_path = args.config.unwrap_or_else(default_config_path);
    let mut config = load_or_create_config(&config_path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    match args.command {
        Command::Run(run_args) => {
            run_args.apply_to(&mut config);
            let config = sanitize_config(config);
            run_enrichment(&config, &config_path, &run_args)
        }
        Command::Login => login(&config, &config_path),
        Command::TokenStatus => {
            report_token_status(&config);
            Ok(())
        }
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = RootArgs::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    if let Err(err) = run_command(args) {
        error!("{err}");
        return Err(err.into());
    }
    Ok(())
}
