use chrono::{DateTime, Duration, Utc};

// Ten years; longer declared lifetimes are treated as this.
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Access/refresh token pair with an absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential from a server-declared lifetime, anchoring it at `now`.
    pub fn from_lifetime(
        access_token: String,
        refresh_token: Option<String>,
        now: DateTime<Utc>,
        lifetime_secs: u64,
    ) -> Self {
        let lifetime = Duration::seconds(lifetime_secs.min(MAX_LIFETIME_SECS) as i64);
        Self {
            access_token,
            refresh_token,
            expires_at: now + lifetime,
        }
    }

    /// True once `now` is within `margin` of `expires_at` or past it.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

// Tokens are bearer secrets; keep them out of logs and panic messages.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
