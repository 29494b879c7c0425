//! Access token decoding
//!
//! Only the `exp` claim is read. The signature is never verified on the
//! client; the backend remains the authority on whether a token is accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use novem_domain::AccessToken;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    InvalidEncoding(String),

    #[error("token payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("token expiry {0} is out of range")]
    InvalidExpiry(i64),
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the expiry instant from the payload segment of a JWT.
pub fn decode_expiry(raw: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = raw.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(TokenError::Malformed),
    };

    // Some issuers keep the padding
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::InvalidEncoding(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::InvalidPayload(e.to_string()))?;

    DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::InvalidExpiry(claims.exp))
}

/// Wrap a raw token, keeping it even when it does not decode.
///
/// An undecodable token is never valid, so the next use triggers a refresh.
pub fn parse_access_token(raw: &str) -> AccessToken {
    match decode_expiry(raw) {
        Ok(expires_at) => AccessToken::from_parts(raw, Some(expires_at)),
        Err(err) => {
            tracing::warn!(error = %err, "Access token could not be decoded, treating as expired");
            AccessToken::from_parts(raw, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_payload(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.c2lnbmF0dXJl", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn decodes_exp_claim() {
        let token = jwt_with_payload(r#"{"exp":1700000000,"user_id":7}"#);
        let expiry = decode_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert_eq!(decode_expiry("abc"), Err(TokenError::Malformed));
        assert_eq!(decode_expiry("a.b"), Err(TokenError::Malformed));
        assert_eq!(decode_expiry("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(decode_expiry("a..c"), Err(TokenError::Malformed));
    }

    #[test]
    fn rejects_payload_without_exp() {
        let token = jwt_with_payload(r#"{"user_id":7}"#);
        assert!(matches!(decode_expiry(&token), Err(TokenError::InvalidPayload(_))));
    }

    #[test]
    fn rejects_non_base64_payload() {
        assert!(matches!(decode_expiry("a.!!!.c"), Err(TokenError::InvalidEncoding(_))));
    }

    #[test]
    fn undecodable_token_is_kept_but_invalid() {
        let token = parse_access_token("not-a-jwt");
        assert_eq!(token.as_str(), "not-a-jwt");
        assert!(token.expires_at().is_none());
    }
}
