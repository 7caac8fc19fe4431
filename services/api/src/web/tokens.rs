//! services/api/src/web/tokens.rs
//!
//! Signed, time-limited tokens carried in e-mail links.
//!
//! A token is `base64url("purpose|email|timestamp_hex|signature_hex")` where the
//! signature is an HMAC-SHA256 over everything before it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use weather_to_ride_core::ports::{PortError, PortResult};

type HmacSha256 = Hmac<Sha256>;

/// How long a link stays usable after it was mailed.
pub const MAX_TOKEN_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    ConfirmEmail,
    ResetPassword,
}

impl TokenPurpose {
    fn tag(self) -> &'static str {
        match self {
            TokenPurpose::ConfirmEmail => "confirm",
            TokenPurpose::ResetPassword => "reset",
        }
    }

    fn rejection(self) -> PortError {
        match self {
            TokenPurpose::ConfirmEmail => {
                PortError::Invalid("The confirmation link is invalid or has expired.".into())
            }
            TokenPurpose::ResetPassword => {
                PortError::Invalid("The reset link is invalid or has expired.".into())
            }
        }
    }
}

fn mac_for(secret: &[u8], payload: &str) -> PortResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| PortError::Unexpected(format!("HMAC init failed: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Issues a token binding `email` to `purpose` at time `issued_at`.
pub fn sign(
    secret: &[u8],
    purpose: TokenPurpose,
    email: &str,
    issued_at: DateTime<Utc>,
) -> PortResult<String> {
    let payload = format!("{}|{}|{:x}", purpose.tag(), email, issued_at.timestamp());
    let signature = mac_for(secret, &payload)?.finalize().into_bytes();
    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Checks the signature, purpose and age of `token` and returns the e-mail it carries.
pub fn verify(
    secret: &[u8],
    purpose: TokenPurpose,
    token: &str,
    now: DateTime<Utc>,
) -> PortResult<String> {
    let reject = || purpose.rejection();

    let decoded = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| reject())?;
    let signed = String::from_utf8(decoded).map_err(|_| reject())?;

    // The e-mail may itself contain '|', so split from the right.
    let (payload, signature_hex) = signed.rsplit_once('|').ok_or_else(reject)?;
    let (head, timestamp_hex) = payload.rsplit_once('|').ok_or_else(reject)?;
    let (tag, email) = head.split_once('|').ok_or_else(reject)?;

    let signature = hex::decode(signature_hex).map_err(|_| reject())?;
    if mac_for(secret, payload)?.verify_slice(&signature).is_err() {
        warn!("Token signature mismatch");
        return Err(reject());
    }
    if tag != purpose.tag() {
        return Err(reject());
    }

    let issued_at = i64::from_str_radix(timestamp_hex, 16)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(reject)?;
    let age = now.signed_duration_since(issued_at);
    if age > Duration::hours(MAX_TOKEN_AGE_HOURS) || age < Duration::zero() {
        return Err(reject());
    }

    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"test-secret-key-0123456789";

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn valid_token_yields_the_email() {
        let token = sign(SECRET, TokenPurpose::ConfirmEmail, "rider@example.com", issued()).unwrap();
        let email = verify(
            SECRET,
            TokenPurpose::ConfirmEmail,
            &token,
            issued() + Duration::hours(23),
        )
        .unwrap();
        assert_eq!(email, "rider@example.com");
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign(SECRET, TokenPurpose::ConfirmEmail, "rider@example.com", issued()).unwrap();
        let result = verify(
            SECRET,
            TokenPurpose::ConfirmEmail,
            &token,
            issued() + Duration::hours(24) + Duration::seconds(1),
        );
        assert_eq!(
            result,
            Err(PortError::Invalid(
                "The confirmation link is invalid or has expired.".into()
            ))
        );
    }

    #[test]
    fn purpose_is_part_of_the_signature() {
        let token = sign(SECRET, TokenPurpose::ConfirmEmail, "rider@example.com", issued()).unwrap();
        assert!(verify(SECRET, TokenPurpose::ResetPassword, &token, issued()).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign(SECRET, TokenPurpose::ResetPassword, "rider@example.com", issued()).unwrap();
        assert!(verify(b"another-secret-key", TokenPurpose::ResetPassword, &token, issued()).is_err());
    }

    #[test]
    fn tampered_email_is_rejected() {
        let token = sign(SECRET, TokenPurpose::ResetPassword, "rider@example.com", issued()).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replace("rider@", "admin@"));
        assert!(verify(SECRET, TokenPurpose::ResetPassword, &forged, issued()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify(SECRET, TokenPurpose::ConfirmEmail, "not-a-token!", issued()).is_err());
        assert!(verify(SECRET, TokenPurpose::ConfirmEmail, "", issued()).is_err());
    }
}
