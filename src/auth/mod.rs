//! Credential lifecycle: persistence, consent, token exchange, and refresh.

pub mod auth_manager;
pub mod authorize_uri;
pub mod consent;
pub mod credential;
pub mod token_store;

pub use auth_manager::{AuthManager, AuthSettings, AuthState};
pub use consent::{BrowserConsent, ConsentProvider};
pub use credential::Credential;
pub use token_store::{AbsentReason, CredentialLoad, TokenStore};
