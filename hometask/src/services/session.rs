use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (User ID)
    pub exp: i64,    // Expiration, seconds since epoch
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    token: String,
}

/// Read the `exp` claim of a bearer token.
///
/// The signature is not checked: the server does that, the client only needs
/// to know whether sending the token is worth it.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let header = decode_header(token).ok()?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}

pub fn is_token_valid(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_some_and(|exp| exp > now)
}

/// Bearer token persisted between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, if any. An unreadable file counts as no session.
    pub fn load(&self) -> Option<String> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Could not read session file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<SessionFile>(&text) {
            Ok(session) => Some(session.token),
            Err(e) => {
                log::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// The stored token if it has not expired at `now`.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.load().filter(|token| is_token_valid(token, now))
    }

    pub fn save(&self, token: &str) -> Result<(), SessionError> {
        let text = serde_json::to_string(&SessionFile {
            token: token.to_string(),
        })?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn make_token(sub: &str, exp: DateTime<Utc>) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    encode(
        &Header::default(),
        &Claims {
            sub: sub.to_string(),
            exp: exp.timestamp(),
        },
        &EncodingKey::from_secret(b"server-secret"),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_token_expiry_reads_exp_claim() {
        let exp = now() + TimeDelta::hours(24);
        let token = make_token("42", exp);

        assert_eq!(token_expiry(&token), Some(exp));
    }

    #[test]
    fn test_token_validity_against_now() {
        let fresh = make_token("42", now() + TimeDelta::seconds(1));
        let stale = make_token("42", now());

        assert!(is_token_valid(&fresh, now()));
        assert!(!is_token_valid(&stale, now()));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        assert_eq!(token_expiry("not-a-jwt"), None);
        assert!(!is_token_valid("a.b.c", now()));
    }

    #[test]
    fn test_session_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load(), None);

        let token = make_token("7", now() + TimeDelta::hours(1));
        store.save(&token).unwrap();
        assert_eq!(store.load(), Some(token.clone()));
        assert_eq!(store.valid_token(now()), Some(token));
        assert_eq!(store.valid_token(now() + TimeDelta::hours(2)), None);

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_session_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        assert_eq!(SessionStore::new(path).load(), None);
    }
}
