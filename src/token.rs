//! Bearer token payload decoding
//!
//! Reads the `exp` claim out of a JWT-shaped access token so the client can
//! tell whether a stored session is still worth presenting to the server.
//! Signatures are never verified here: the expiry is a convenience check,
//! the server stays the authority and re-validates through the profile
//! endpoint.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Minutes before expiry in which a token becomes eligible for refresh
pub const REFRESH_WINDOW_MINUTES: i64 = 10;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, Unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decode the payload segment of `token`.
///
/// Returns `None` unless the token has exactly three dot-separated segments
/// and the middle one is base64 (url-safe or standard, padding optional)
/// encoding a JSON object.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        debug!(segments = token.split('.').count(), "Token does not have three segments");
        return None;
    };

    let bytes = match URL_SAFE_LENIENT.decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => match STANDARD_LENIENT.decode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Token payload is not base64");
                return None;
            }
        },
    };

    match serde_json::from_slice::<Claims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "Token payload is not a JSON claims object");
            None
        }
    }
}

/// Expiry instant of `token`, if it can be decoded and carries `exp`
pub fn expiration(token: &str) -> Option<SystemTime> {
    let exp = decode(token)?.exp?;
    if exp >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_secs(exp as u64))
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_secs(exp.unsigned_abs()))
    }
}

/// Whole minutes until expiry, rounded down. Zero when the token cannot be
/// decoded or has no `exp`; negative once expired.
pub fn time_remaining(token: &str) -> i64 {
    time_remaining_at(token, SystemTime::now())
}

pub fn time_remaining_at(token: &str, now: SystemTime) -> i64 {
    let Some(exp) = decode(token).and_then(|claims| claims.exp) else {
        return 0;
    };
    let diff_ms = exp.saturating_mul(1000).saturating_sub(unix_millis(now));
    diff_ms.div_euclid(60_000)
}

/// `exp <= now`. Undecodable tokens are treated as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, SystemTime::now())
}

pub fn is_expired_at(token: &str, now: SystemTime) -> bool {
    match decode(token).and_then(|claims| claims.exp) {
        Some(exp) => exp <= unix_seconds(now),
        None => true,
    }
}

/// True only inside the closing refresh window: an already expired token
/// needs a fresh login, not a refresh.
pub fn should_refresh(token: &str) -> bool {
    should_refresh_within(token, REFRESH_WINDOW_MINUTES, SystemTime::now())
}

pub fn should_refresh_within(token: &str, window_minutes: i64, now: SystemTime) -> bool {
    let remaining = time_remaining_at(token, now);
    remaining > 0 && remaining <= window_minutes
}

fn unix_millis(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

pub(crate) fn unix_seconds(at: SystemTime) -> i64 {
    unix_millis(at).div_euclid(1000)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    /// Build an unsigned JWT-shaped token with the given `exp`
    pub(crate) fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"42","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    /// Token expiring `secs` seconds after the current wall clock
    pub(crate) fn token_expiring_in(secs: i64) -> String {
        token_with_exp(unix_seconds(SystemTime::now()) + secs)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_decode_reads_exp() {
        let claims = decode(&token_with_exp(1_700_000_000)).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.sub, Some(serde_json::json!("42")));
    }

    #[test]
    fn test_decode_accepts_padded_standard_payload() {
        let payload = STANDARD.encode(br#"{"exp":1700000000,"role":"admin"}"#);
        let claims = decode(&format!("h.{payload}.s")).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.extra.get("role"), Some(&serde_json::json!("admin")));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode("").is_none());
        assert!(decode("only-one").is_none());
        assert!(decode("two.segments").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("h.!!!not-base64!!!.s").is_none());
        let not_json = URL_SAFE_NO_PAD.encode("plain text");
        assert!(decode(&format!("h.{not_json}.s")).is_none());
        let array = URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert!(decode(&format!("h.{array}.s")).is_none());
    }

    #[test]
    fn test_missing_exp_is_expired_with_no_time_left() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"1"}"#);
        let token = format!("h.{payload}.s");
        assert!(decode(&token).is_some());
        assert!(is_expired(&token));
        assert_eq!(time_remaining(&token), 0);
        assert!(!should_refresh(&token));
        assert!(expiration(&token).is_none());
    }

    #[test]
    fn test_expiry_boundaries() {
        let token = token_with_exp(1_000);
        assert!(!is_expired_at(&token, at(999)));
        assert!(is_expired_at(&token, at(1_000)));
        assert!(is_expired_at(&token, at(1_001)));
        assert_eq!(expiration(&token), Some(at(1_000)));
    }

    #[test]
    fn test_time_remaining_rounds_down() {
        let token = token_with_exp(10_000);
        assert_eq!(time_remaining_at(&token, at(10_000 - 300)), 5);
        assert_eq!(time_remaining_at(&token, at(10_000 - 299)), 4);
        assert_eq!(time_remaining_at(&token, at(10_000)), 0);
        assert_eq!(time_remaining_at(&token, at(10_001)), -1);
        assert_eq!(time_remaining_at("garbage", at(10_000)), 0);
    }

    #[test]
    fn test_refresh_window() {
        let token = token_with_exp(100_000);
        // 5 minutes left
        assert!(should_refresh_within(&token, REFRESH_WINDOW_MINUTES, at(100_000 - 300)));
        // exactly at the window edge
        assert!(should_refresh_within(&token, REFRESH_WINDOW_MINUTES, at(100_000 - 600)));
        // 15 minutes left
        assert!(!should_refresh_within(&token, REFRESH_WINDOW_MINUTES, at(100_000 - 900)));
        // expired or expiring now
        assert!(!should_refresh_within(&token, REFRESH_WINDOW_MINUTES, at(100_000)));
        assert!(!should_refresh_within(&token, REFRESH_WINDOW_MINUTES, at(100_500)));
    }

    #[test]
    fn test_past_tokens_are_expired_and_not_refreshable() {
        for secs_ago in [1, 60, 3_600, 86_400 * 30] {
            let token = token_expiring_in(-secs_ago);
            assert!(is_expired(&token), "expired {secs_ago}s ago");
            assert!(!should_refresh(&token), "expired {secs_ago}s ago");
        }
    }

    #[test]
    fn test_wall_clock_window() {
        assert!(should_refresh(&token_expiring_in(5 * 60)));
        assert!(!should_refresh(&token_expiring_in(15 * 60)));
        assert!(!should_refresh(&token_expiring_in(0)));
        assert!(!is_expired(&token_expiring_in(3_600)));
    }
}
