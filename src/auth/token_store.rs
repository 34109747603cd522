//! Single-record credential file.
//!
//! The file holds one delimited record `access_token,refresh_token,expires_at`
//! with `expires_at` as RFC 3339. It is replaced wholesale on every save.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use log::warn;

use super::Credential;
use crate::dataset::write_bytes_atomic;
use crate::error::{EnrichError, Result};

/// Why no credential could be produced from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    NotFound,
    Unreadable(String),
    Malformed(String),
}

impl std::fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored credential"),
            Self::Unreadable(detail) => write!(f, "credential file unreadable: {detail}"),
            Self::Malformed(detail) => write!(f, "credential file malformed: {detail}"),
        }
    }
}

/// Outcome of reading the credential file. Parse failures are not errors: they
/// make the caller take the no-credential path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLoad {
    Present(Credential),
    Absent(AbsentReason),
}

impl CredentialLoad {
    pub fn into_credential(self) -> Option<Credential> {
        match self {
            Self::Present(credential) => Some(credential),
            Self::Absent(_) => None,
        }
    }
}

/// Owns the credential file; nothing else reads or writes it.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the stored record with `credential`.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let mut bytes = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut bytes);
            writer
                .write_record([
                    credential.access_token.as_str(),
                    credential.refresh_token.as_deref().unwrap_or(""),
                    credential.expires_at.to_rfc3339().as_str(),
                ])
                .map_err(|err| EnrichError::csv(&self.path, err))?;
            writer
                .flush()
                .map_err(|err| EnrichError::io(&self.path, err))?;
        }
        write_bytes_atomic(&self.path, &bytes)
    }

    /// Returns the most recently saved record, or the reason there is none.
    pub fn load(&self) -> CredentialLoad {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return CredentialLoad::Absent(AbsentReason::NotFound)
            }
            Err(err) => {
                warn!(
                    "Token file {} could not be read; treating as absent. error={}",
                    self.path.display(),
                    err
                );
                return CredentialLoad::Absent(AbsentReason::Unreadable(err.to_string()));
            }
        };
        match parse_credential(&text) {
            Ok(credential) => CredentialLoad::Present(credential),
            Err(detail) => {
                warn!(
                    "Token file {} is invalid; treating as absent. error={}",
                    self.path.display(),
                    detail
                );
                CredentialLoad::Absent(AbsentReason::Malformed(detail))
            }
        }
    }
}

fn parse_credential(text: &str) -> std::result::Result<Credential, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let record = reader
        .records()
        .next()
        .ok_or_else(|| "empty file".to_string())?
        .map_err(|err| err.to_string())?;
    if record.len() != 3 {
        return Err(format!("expected 3 fields, found {}", record.len()));
    }
    let access_token = record[0].trim();
    if access_token.is_empty() {
        return Err("access_token is empty".to_string());
    }
    let refresh_token = Some(record[1].trim())
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned);
    let expires_at = parse_expiry(record[2].trim())?;
    Ok(Credential {
        access_token: access_token.to_string(),
        refresh_token,
        expires_at,
    })
}

/// Accepts RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` timestamp in local time
/// as written by older token files.
fn parse_expiry(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|err| format!("invalid expires_at {raw:?}: {err}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("expires_at {raw:?} does not exist in local time"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{AbsentReason, CredentialLoad, TokenStore};
    use crate::auth::Credential;

    fn sample_credential(refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "BQDa-access".to_string(),
            refresh_token: refresh.map(ToOwned::to_owned),
            expires_at: Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()
                + Duration::milliseconds(250),
        }
    }

    #[test]
    fn test_save_then_load_returns_latest_record() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token.txt"));

        store
            .save(&sample_credential(Some("first-refresh")))
            .expect("save first");
        let mut second = sample_credential(None);
        second.access_token = "second-access".to_string();
        store.save(&second).expect("save second");

        assert_eq!(store.load(), CredentialLoad::Present(second));
    }

    #[test]
    fn test_saved_file_is_single_delimited_record() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token.txt"));
        store
            .save(&sample_credential(Some("refresh")))
            .expect("save credential");

        let text = std::fs::read_to_string(store.path()).expect("read token file");
        assert_eq!(text, "BQDa-access,refresh,2024-03-01T13:00:00.250+00:00\n");
    }

    #[test]
    fn test_missing_file_is_absent_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token.txt"));
        assert_eq!(
            store.load(),
            CredentialLoad::Absent(AbsentReason::NotFound)
        );
    }

    #[test]
    fn test_malformed_records_are_absent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token.txt"));
        for contents in [
            "",
            "only-one-field",
            "access,refresh,not-a-date",
            ",refresh,2024-03-01T13:00:00+00:00",
            "a,b,c,d",
        ] {
            std::fs::write(store.path(), contents).expect("write token file");
            assert!(
                matches!(
                    store.load(),
                    CredentialLoad::Absent(AbsentReason::Malformed(_))
                ),
                "contents {contents:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_legacy_naive_timestamp_is_accepted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token.txt"));
        std::fs::write(store.path(), "access,refresh,2024-03-01 13:00:00.123456")
            .expect("write token file");

        let credential = store
            .load()
            .into_credential()
            .expect("legacy record should load");
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh"));
    }
}
