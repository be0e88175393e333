//! PBKDF2-SHA-256 password hashing with self-describing records.
//!
//! Stored form is `pbkdf2:<iterations>:<salt-hex>:<hash-hex>` so the
//! iteration count can be raised without invalidating existing records.

use anyhow::{Context, Result};
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;

use super::tokens::constant_time_eq;

/// Work factor for new records. Records with other counts still verify.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_BYTES: usize = 32;
const HASH_BYTES: usize = 32;

/// Upper bound accepted at verification, so a hostile record cannot pin the
/// CPU with an absurd iteration count.
const MAX_ITERATIONS: u32 = 10_000_000;

/// Derive a new self-describing password record.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_BYTES];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate password salt")?;

    let mut derived = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut derived);

    Ok(format!(
        "pbkdf2:{}:{}:{}",
        PBKDF2_ITERATIONS,
        hex::encode(salt),
        hex::encode(derived)
    ))
}

/// Verify a password against a stored record.
///
/// Malformed records verify as false rather than erroring; a corrupt row must
/// behave like a wrong password, not a server fault.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split(':');
    let (Some(scheme), Some(iterations), Some(salt_hex), Some(hash_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != "pbkdf2" {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return false;
    }
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    if expected.is_empty() || expected.len() > 64 {
        return false;
    }

    let mut derived = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut derived);

    constant_time_eq(&derived, &expected)
}

/// Burn the same CPU as a real verification without any stored record.
///
/// Login calls this when the account does not exist or has no password, so
/// the response time does not reveal which branch was taken.
pub fn equalize_verification_cost(password: &str) {
    let salt = [0u8; SALT_BYTES];
    let mut derived = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut derived);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_verifies() {
        let record = hash_password("s3cret-password").expect("hash");
        assert!(record.starts_with("pbkdf2:100000:"));
        assert!(verify_password("s3cret-password", &record));
        assert!(!verify_password("wrong-password", &record));
    }

    #[test]
    fn distinct_salts_per_record() {
        let first = hash_password("same").expect("hash");
        let second = hash_password("same").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn verifies_records_with_other_iteration_counts() {
        // A legacy record derived with a lower count must still verify.
        let salt = [7u8; 32];
        let mut derived = [0u8; 32];
        pbkdf2_hmac::<Sha256>(b"legacy", &salt, 10_000, &mut derived);
        let record = format!("pbkdf2:10000:{}:{}", hex::encode(salt), hex::encode(derived));
        assert!(verify_password("legacy", &record));
    }

    #[test]
    fn malformed_records_verify_false() {
        for stored in [
            "",
            "pbkdf2",
            "pbkdf2:100000",
            "pbkdf2:100000:aa",
            "pbkdf2:100000:aa:bb:cc",
            "bcrypt:100000:aa:bb",
            "pbkdf2:zero:aa:bb",
            "pbkdf2:0:aa:bb",
            "pbkdf2:99999999:aa:bb",
            "pbkdf2:100000:not-hex:bb",
            "pbkdf2:100000:aa:not-hex",
            "pbkdf2:100000:aa:",
        ] {
            assert!(!verify_password("anything", stored), "accepted: {stored}");
        }
    }

    #[test]
    fn equalize_verification_cost_does_not_panic() {
        equalize_verification_cost("any password at all");
    }
}
