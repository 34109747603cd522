//! Owns the current credential and keeps it valid for catalog requests.
//!
//! State machine:
//! `Uninitialized -> Authorizing -> Authorized -> (Expired -> Refreshing -> Authorized)*`.
//! A failed refresh leaves the manager in `Expired`; recovery is an explicit
//! `authorize()` (the `login` command), never an automatic consent prompt.

use chrono::Duration;
use log::{debug, info, warn};

use super::authorize_uri::{encode_authorize_url, AuthorizeRequest};
use super::{ConsentProvider, Credential, CredentialLoad, TokenStore};
use crate::backends::{TokenEndpoint, TokenGrant};
use crate::clock::Clock;
use crate::error::{EnrichError, Result};

const LOGIN_HINT: &str = "run `history-enricher login` to authorize again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Authorizing,
    Authorized,
    Expired,
    Refreshing,
}

/// Client registration and expiry policy for the manager.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub authorize: AuthorizeRequest,
    /// Tail of a token's lifetime that already counts as expired.
    pub expiry_margin: Duration,
    /// Lifetime used when the token endpoint omits `expires_in`.
    pub default_lifetime_secs: u64,
}

pub struct AuthManager {
    store: TokenStore,
    endpoint: Box<dyn TokenEndpoint>,
    consent: Box<dyn ConsentProvider>,
    clock: Box<dyn Clock>,
    settings: AuthSettings,
    state: AuthState,
    credential: Option<Credential>,
}

impl AuthManager {
    /// Loads the stored credential and authorizes interactively when it is
    /// absent, malformed, or already expired.
    pub fn new(
        store: TokenStore,
        endpoint: Box<dyn TokenEndpoint>,
        consent: Box<dyn ConsentProvider>,
        clock: Box<dyn Clock>,
        settings: AuthSettings,
    ) -> Result<Self> {
        let mut manager = Self::uninitialized(store, endpoint, consent, clock, settings);
        manager.initialize()?;
        Ok(manager)
    }

    /// Ignores any stored credential and authorizes interactively right away.
    pub fn login(
        store: TokenStore,
        endpoint: Box<dyn TokenEndpoint>,
        consent: Box<dyn ConsentProvider>,
        clock: Box<dyn Clock>,
        settings: AuthSettings,
    ) -> Result<Self> {
        let mut manager = Self::uninitialized(store, endpoint, consent, clock, settings);
        manager.authorize()?;
        Ok(manager)
    }

    fn uninitialized(
        store: TokenStore,
        endpoint: Box<dyn TokenEndpoint>,
        consent: Box<dyn ConsentProvider>,
        clock: Box<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            endpoint,
            consent,
            clock,
            settings,
            state: AuthState::Uninitialized,
            credential: None,
        }
    }

    fn initialize(&mut self) -> Result<()> {
        match self.store.load() {
            CredentialLoad::Present(credential)
                if !credential.is_expired_at(self.clock.now(), self.settings.expiry_margin) =>
            {
                info!("Token is up to date (expires {})", credential.expires_at);
                self.credential = Some(credential);
                self.state = AuthState::Authorized;
                Ok(())
            }
            CredentialLoad::Present(credential) => {
                info!(
                    "Stored token expired at {}; starting authorization",
                    credential.expires_at
                );
                self.authorize()
            }
            CredentialLoad::Absent(reason) => {
                info!("{reason}; starting authorization");
                self.authorize()
            }
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Runs the consent step and exchanges the resulting code for a new credential.
    pub fn authorize(&mut self) -> Result<()> {
        self.state = AuthState::Authorizing;
        let authorize_url = encode_authorize_url(&self.settings.authorize);
        let code = self.consent.obtain_authorization_code(&authorize_url)?;
        let grant = self.endpoint.exchange_authorization_code(&code)?;
        let access_token = grant.access_token.clone().ok_or_else(|| {
            EnrichError::AuthExchange(
                "authorization code exchange returned no access token".to_string(),
            )
        })?;
        let credential = Credential::from_lifetime(
            access_token,
            grant.refresh_token.clone(),
            self.clock.now(),
            self.lifetime_secs(&grant),
        );
        self.store.save(&credential)?;
        info!("Authorized; token valid until {}", credential.expires_at);
        self.credential = Some(credential);
        self.state = AuthState::Authorized;
        Ok(())
    }

    /// Returns an access token that is valid right now, refreshing it first when
    /// it has expired.
    pub fn get_valid_token(&mut self) -> Result<String> {
        let now = self.clock.now();
        let (access_token, refresh_token, expired) = match self.credential.as_ref() {
            Some(credential) => (
                credential.access_token.clone(),
                credential.refresh_token.clone(),
                credential.is_expired_at(now, self.settings.expiry_margin),
            ),
            None => {
                return Err(EnrichError::AuthExchange(format!(
                    "no credential is available; {LOGIN_HINT}"
                )))
            }
        };
        if !expired {
            return Ok(access_token);
        }

        self.state = AuthState::Expired;
        debug!("Access token expired; refreshing");
        let Some(refresh_token) = refresh_token else {
            return Err(EnrichError::AuthExchange(format!(
                "access token expired and no refresh token is stored; {LOGIN_HINT}"
            )));
        };
        self.refresh(refresh_token)
    }

    fn refresh(&mut self, refresh_token: String) -> Result<String> {
        self.state = AuthState::Refreshing;
        let grant = match self.endpoint.refresh_access_token(&refresh_token) {
            Ok(grant) => grant,
            Err(err) => {
                self.state = AuthState::Expired;
                warn!("Token refresh failed; stored credential left unchanged");
                let detail = match err {
                    EnrichError::AuthExchange(detail) => detail,
                    other => other.to_string(),
                };
                return Err(EnrichError::AuthExchange(format!("{detail}; {LOGIN_HINT}")));
            }
        };
        let Some(access_token) = grant.access_token.clone() else {
            self.state = AuthState::Expired;
            return Err(EnrichError::AuthExchange(format!(
                "token refresh returned no access token; {LOGIN_HINT}"
            )));
        };
        // The provider only rotates the refresh token when it sends a new one.
        let next_refresh_token = grant.refresh_token.clone().or(Some(refresh_token));
        let credential = Credential::from_lifetime(
            access_token,
            next_refresh_token,
            self.clock.now(),
            self.lifetime_secs(&grant),
        );
        self.store.save(&credential)?;
        info!("Token refreshed; valid until {}", credential.expires_at);
        let access_token = credential.access_token.clone();
        self.credential = Some(credential);
        self.state = AuthState::Authorized;
        Ok(access_token)
    }

    fn lifetime_secs(&self, grant: &TokenGrant) -> u64 {
        grant
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(self.settings.default_lifetime_secs)
    }
}

#[cfg(test)]
pub mod test_support {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use crate::auth::ConsentProvider;
    use crate::backends::{TokenEndpoint, TokenGrant};
    use crate::error::{EnrichError, Result};

    /// Token endpoint double with scripted grants and shared call counters.
    #[derive(Clone, Default)]
    pub struct FakeTokenEndpoint {
        pub exchange_calls: Rc<Cell<usize>>,
        pub refresh_calls: Rc<Cell<usize>>,
        pub exchange_grants: Rc<RefCell<VecDeque<Result<TokenGrant>>>>,
        pub refresh_grants: Rc<RefCell<VecDeque<Result<TokenGrant>>>>,
    }

    pub fn grant(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenGrant {
        TokenGrant {
            access_token: Some(access.to_string()),
            refresh_token: refresh.map(ToOwned::to_owned),
            expires_in,
        }
    }

    impl FakeTokenEndpoint {
        pub fn with_exchange(self, grant: Result<TokenGrant>) -> Self {
            self.exchange_grants.borrow_mut().push_back(grant);
            self
        }

        pub fn with_refresh(self, grant: Result<TokenGrant>) -> Self {
            self.refresh_grants.borrow_mut().push_back(grant);
            self
        }
    }

    impl TokenEndpoint for FakeTokenEndpoint {
        fn exchange_authorization_code(&self, _code: &str) -> Result<TokenGrant> {
            self.exchange_calls.set(self.exchange_calls.get() + 1);
            self.exchange_grants
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(EnrichError::AuthExchange("unscripted exchange".into())))
        }

        fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenGrant> {
            self.refresh_calls.set(self.refresh_calls.get() + 1);
            self.refresh_grants
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(EnrichError::AuthExchange("unscripted refresh".into())))
        }
    }

    /// Consent double that always answers with the same code.
    #[derive(Clone, Default)]
    pub struct FixedConsent {
        pub prompts: Rc<RefCell<Vec<String>>>,
    }

    impl ConsentProvider for FixedConsent {
        fn obtain_authorization_code(&mut self, authorize_url: &str) -> Result<String> {
            self.prompts.borrow_mut().push(authorize_url.to_string());
            Ok("consent-code".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use chrono::Duration;

    use super::test_support::{grant, FakeTokenEndpoint, FixedConsent};
    use super::{AuthManager, AuthSettings, AuthState};
    use crate::auth::authorize_uri::AuthorizeRequest;
    use crate::auth::{Credential, CredentialLoad, TokenStore};
    use crate::clock::test_support::ManualClock;
    use crate::clock::Clock;
    use crate::error::EnrichError;

    fn settings() -> AuthSettings {
        AuthSettings {
            authorize: AuthorizeRequest {
                authorize_url: "https://accounts.example.com/authorize".to_string(),
                client_id: "client".to_string(),
                redirect_uri: "http://localhost/".to_string(),
                scope: "user-top-read".to_string(),
            },
            expiry_margin: Duration::zero(),
            default_lifetime_secs: 3600,
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: TokenStore,
        clock: Rc<ManualClock>,
        endpoint: FakeTokenEndpoint,
        consent: FixedConsent,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("temp dir");
            let store = TokenStore::new(dir.path().join("token.txt"));
            Self {
                _dir: dir,
                store,
                clock: Rc::new(ManualClock::fixed_start()),
                endpoint: FakeTokenEndpoint::default(),
                consent: FixedConsent::default(),
            }
        }

        fn store_credential(&self, expires_in: Duration, refresh: Option<&str>) -> Credential {
            let credential = Credential {
                access_token: "stored-access".to_string(),
                refresh_token: refresh.map(ToOwned::to_owned),
                expires_at: self.clock.now() + expires_in,
            };
            self.store.save(&credential).expect("seed credential");
            credential
        }

        fn manager(&self) -> crate::error::Result<AuthManager> {
            AuthManager::new(
                self.store.clone(),
                Box::new(self.endpoint.clone()),
                Box::new(self.consent.clone()),
                Box::new(self.clock.clone()),
                settings(),
            )
        }
    }

    #[test]
    fn test_valid_stored_credential_is_used_without_network() {
        let harness = Harness::new();
        harness.store_credential(Duration::minutes(30), Some("stored-refresh"));

        let mut manager = harness.manager().expect("manager should start");
        assert_eq!(manager.state(), AuthState::Authorized);
        for _ in 0..3 {
            assert_eq!(
                manager.get_valid_token().expect("token should be valid"),
                "stored-access"
            );
        }
        assert_eq!(harness.endpoint.refresh_calls.get(), 0);
        assert_eq!(harness.endpoint.exchange_calls.get(), 0);
        assert!(harness.consent.prompts.borrow().is_empty());
    }

    #[test]
    fn test_missing_credential_runs_consent_and_persists_grant() {
        let mut harness = Harness::new();
        harness.endpoint = FakeTokenEndpoint::default().with_exchange(Ok(grant(
            "fresh-access",
            Some("fresh-refresh"),
            None,
        )));

        let manager = harness.manager().expect("manager should authorize");
        assert_eq!(manager.state(), AuthState::Authorized);
        assert_eq!(harness.consent.prompts.borrow().len(), 1);
        assert!(harness.consent.prompts.borrow()[0].contains("response_type=code"));

        let stored = harness
            .store
            .load()
            .into_credential()
            .expect("credential should be persisted");
        assert_eq!(stored.access_token, "fresh-access");
        assert_eq!(stored.refresh_token.as_deref(), Some("fresh-refresh"));
        assert_eq!(stored.expires_at, harness.clock.now() + Duration::seconds(3600));
    }

    #[test]
    fn test_expired_stored_credential_reauthorizes_on_startup() {
        let mut harness = Harness::new();
        harness.store_credential(Duration::minutes(-5), Some("stored-refresh"));
        harness.endpoint =
            FakeTokenEndpoint::default().with_exchange(Ok(grant("fresh-access", None, Some(600))));

        let mut manager = harness.manager().expect("manager should authorize");
        assert_eq!(harness.endpoint.exchange_calls.get(), 1);
        assert_eq!(harness.endpoint.refresh_calls.get(), 0);
        assert_eq!(manager.get_valid_token().expect("token"), "fresh-access");
    }

    #[test]
    fn test_malformed_token_file_falls_back_to_authorization() {
        let mut harness = Harness::new();
        std::fs::write(harness.store.path(), "garbage").expect("write token file");
        harness.endpoint =
            FakeTokenEndpoint::default().with_exchange(Ok(grant("fresh-access", None, None)));

        harness.manager().expect("manager should authorize");
        assert_eq!(harness.endpoint.exchange_calls.get(), 1);
    }

    #[test]
    fn test_exchange_without_access_token_is_fatal() {
        let mut harness = Harness::new();
        harness.endpoint = FakeTokenEndpoint::default().with_exchange(Ok(Default::default()));

        let result = harness.manager();
        assert!(matches!(result, Err(EnrichError::AuthExchange(_))));
        assert!(matches!(harness.store.load(), CredentialLoad::Absent(_)));
    }

    #[test]
    fn test_expired_token_triggers_exactly_one_refresh() {
        let mut harness = Harness::new();
        let original = harness.store_credential(Duration::minutes(10), Some("stored-refresh"));
        harness.endpoint = FakeTokenEndpoint::default().with_refresh(Ok(grant(
            "refreshed-access",
            None,
            Some(3600),
        )));
        let mut manager = harness.manager().expect("manager should start");

        harness.clock.advance(Duration::minutes(11));
        assert_eq!(
            manager.get_valid_token().expect("refresh should succeed"),
            "refreshed-access"
        );
        assert_eq!(
            manager.get_valid_token().expect("refreshed token is valid"),
            "refreshed-access"
        );
        assert_eq!(harness.endpoint.refresh_calls.get(), 1);
        assert_eq!(manager.state(), AuthState::Authorized);

        let stored = harness.store.load().into_credential().expect("persisted");
        assert!(stored.expires_at > original.expires_at);
        assert_eq!(stored.refresh_token.as_deref(), Some("stored-refresh"));
    }

    #[test]
    fn test_refresh_adopts_rotated_refresh_token() {
        let mut harness = Harness::new();
        harness.store_credential(Duration::seconds(1), Some("old-refresh"));
        harness.endpoint = FakeTokenEndpoint::default().with_refresh(Ok(grant(
            "refreshed-access",
            Some("rotated-refresh"),
            None,
        )));
        let mut manager = harness.manager().expect("manager should start");

        harness.clock.advance(Duration::seconds(1));
        manager.get_valid_token().expect("refresh should succeed");
        assert_eq!(
            manager
                .credential()
                .and_then(|credential| credential.refresh_token.as_deref()),
            Some("rotated-refresh")
        );
    }

    #[test]
    fn test_refresh_failure_is_fatal_and_keeps_stored_credential() {
        let mut harness = Harness::new();
        let original = harness.store_credential(Duration::minutes(1), Some("revoked"));
        harness.endpoint = FakeTokenEndpoint::default().with_refresh(Err(
            EnrichError::AuthExchange("invalid_grant".to_string()),
        ));
        let mut manager = harness.manager().expect("manager should start");

        harness.clock.advance(Duration::minutes(2));
        let err = manager.get_valid_token().expect_err("refresh should fail");
        assert!(err.to_string().contains("history-enricher login"));
        assert_eq!(manager.state(), AuthState::Expired);
        assert_eq!(harness.endpoint.exchange_calls.get(), 0);
        assert!(harness.consent.prompts.borrow().is_empty());
        assert_eq!(
            harness.store.load(),
            CredentialLoad::Present(original)
        );
    }

    #[test]
    fn test_expired_token_without_refresh_token_is_fatal() {
        let harness = Harness::new();
        harness.store_credential(Duration::minutes(1), None);
        let mut manager = harness.manager().expect("manager should start");

        harness.clock.advance(Duration::minutes(1));
        assert!(matches!(
            manager.get_valid_token(),
            Err(EnrichError::AuthExchange(_))
        ));
        assert_eq!(harness.endpoint.refresh_calls.get(), 0);
    }

    #[test]
    fn test_expiry_margin_refreshes_early() {
        let mut harness = Harness::new();
        harness.store_credential(Duration::seconds(90), Some("refresh"));
        harness.endpoint =
            FakeTokenEndpoint::default().with_refresh(Ok(grant("early-access", None, None)));
        let mut manager = AuthManager::new(
            harness.store.clone(),
            Box::new(harness.endpoint.clone()),
            Box::new(harness.consent.clone()),
            Box::new(harness.clock.clone()),
            AuthSettings {
                expiry_margin: Duration::seconds(30),
                ..settings()
            },
        )
        .expect("manager should start");

        harness.clock.advance(Duration::seconds(70));
        assert_eq!(manager.get_valid_token().expect("token"), "early-access");
        assert_eq!(harness.endpoint.refresh_calls.get(), 1);
    }

    #[test]
    fn test_login_skips_valid_stored_credential() {
        let mut harness = Harness::new();
        harness.store_credential(Duration::minutes(30), Some("refresh"));
        harness.endpoint =
            FakeTokenEndpoint::default().with_exchange(Ok(grant("login-access", None, None)));

        let mut manager = AuthManager::login(
            harness.store.clone(),
            Box::new(harness.endpoint.clone()),
            Box::new(harness.consent.clone()),
            Box::new(harness.clock.clone()),
            settings(),
        )
        .expect("login should succeed");
        assert_eq!(harness.consent.prompts.borrow().len(), 1);
        assert_eq!(manager.get_valid_token().expect("token"), "login-access");
        let stored = harness.store.load().into_credential().expect("persisted");
        assert_eq!(stored.access_token, "login-access");
    }

    #[test]
    fn test_explicit_authorize_replaces_credential() {
        let mut harness = Harness::new();
        harness.store_credential(Duration::minutes(30), Some("refresh"));
        harness.endpoint =
            FakeTokenEndpoint::default().with_exchange(Ok(grant("login-access", None, None)));
        let mut manager = harness.manager().expect("manager should start");

        manager.authorize().expect("login should succeed");
        assert_eq!(manager.get_valid_token().expect("token"), "login-access");
        assert_eq!(harness.consent.prompts.borrow().len(), 1);
    }
}
