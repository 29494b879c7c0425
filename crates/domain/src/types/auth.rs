//! Session and credential types

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Short-lived bearer credential.
///
/// `expires_at` is `None` when the token could not be decoded; such a token
/// is never valid and is replaced by the next refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn from_parts(raw: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { raw: raw.into(), expires_at }
    }

    /// The encoded token, as sent in the `Authorization` header.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Valid iff it decoded and its expiry is strictly in the future.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp > now)
    }

    /// Whether the token expires within `threshold` of `now` (or is invalid).
    #[must_use]
    pub fn expires_within(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| exp - now <= threshold)
    }

    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| (exp - now).num_seconds())
    }

    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.raw)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("raw", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Long-lived credential used only to mint new access tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken([REDACTED])")
    }
}

/// Cached user blob returned by login, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub Value);

impl Identity {
    /// Convenience accessor for a string field of the user object.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

/// A logged-in user: both credentials plus the cached identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access: AccessToken,
    pub refresh: RefreshToken,
    pub identity: Option<Identity>,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    UserInitiated,
    RefreshFailed,
    AccountDeleted,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInitiated => f.write_str("user_initiated"),
            Self::RefreshFailed => f.write_str("refresh_failed"),
            Self::AccountDeleted => f.write_str("account_deleted"),
        }
    }
}

/// Single-flight guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshStatus {
    Idle,
    Refreshing,
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: RefreshToken,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Present when the backend rotates refresh tokens
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    pub refresh: RefreshToken,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn validity_is_strictly_before_expiry() {
        let token = AccessToken::from_parts("abc", Some(at(1_000)));
        assert!(token.is_valid_at(at(999)));
        assert!(!token.is_valid_at(at(1_000)));
        assert!(!token.is_valid_at(at(1_001)));
    }

    #[test]
    fn undecodable_token_is_never_valid() {
        let token = AccessToken::from_parts("garbage", None);
        assert!(!token.is_valid_at(at(0)));
        assert!(token.expires_within(Duration::zero(), at(0)));
        assert_eq!(token.seconds_until_expiry(at(0)), None);
    }

    #[test]
    fn threshold_window() {
        let token = AccessToken::from_parts("abc", Some(at(1_000)));
        assert!(!token.expires_within(Duration::seconds(300), at(600)));
        assert!(token.expires_within(Duration::seconds(300), at(700)));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let token = AccessToken::from_parts("secret-access", None);
        let refresh = RefreshToken::new("secret-refresh");
        let login = LoginRequest { email: "a@b.c".into(), password: "hunter2".into() };

        let out = format!("{token:?} {refresh:?} {login:?}");
        assert!(!out.contains("secret-access"));
        assert!(!out.contains("secret-refresh"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn refresh_response_without_rotation() {
        let response: RefreshResponse = serde_json::from_value(json!({"access": "new"})).unwrap();
        assert_eq!(response.access, "new");
        assert!(response.refresh.is_none());
    }

    #[test]
    fn refresh_request_wire_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh: RefreshToken::new("r1") }).unwrap();
        assert_eq!(body, json!({"refresh": "r1"}));
    }
}
