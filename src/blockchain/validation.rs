use chrono::DateTime;
use thiserror::Error;

use super::crypto::{
    SignaturePair, ADDRESS_HEX_LENGTH, PUBLIC_KEY_HEX_LENGTH, SIGNATURE_COMPONENT_HEX_LENGTH,
};

/// Reasons a set of submitted transaction fields can be rejected.
///
/// Each variant carries the offending value so callers get a usable
/// reason string without extra context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("The public key does not match the sender address: {0}")]
    AddressKeyMismatch(String),

    #[error("Invalid transfer value: {0}")]
    InvalidValue(u64),

    #[error("Invalid transaction fee: {0}")]
    InvalidFee(u64),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid or missing signature. Expected a pair of hex numeric strings")]
    InvalidSignatureFormat,
}

/// Checks that a string is entirely lowercase hexadecimal
fn is_lowercase_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Checks that an address is a 40-character lowercase hex string
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LENGTH && is_lowercase_hex(address)
}

/// Checks that a public key is a 64-character lowercase hex string
pub fn is_valid_public_key(public_key: &str) -> bool {
    public_key.len() == PUBLIC_KEY_HEX_LENGTH && is_lowercase_hex(public_key)
}

/// Checks that a signature is an ordered pair of hex numeric strings, each
/// at most 64 characters
pub fn is_valid_signature_format(signature: &SignaturePair) -> bool {
    signature
        .iter()
        .all(|component| component.len() <= SIGNATURE_COMPONENT_HEX_LENGTH && is_lowercase_hex(component))
}

/// Checks that a transfer value is within the representable range
pub fn is_valid_transfer_value(value: u64, max_value: u64) -> bool {
    value <= max_value
}

/// Checks that a fee does not exceed the configured maximum
pub fn is_valid_fee(fee: u64, max_fee: u64) -> bool {
    fee <= max_fee
}

/// Checks that a date is a valid ISO-8601 timestamp. It is not required to
/// be in the past.
pub fn is_valid_date(date: &str) -> bool {
    DateTime::parse_from_rfc3339(date).is_ok()
}

/// Checks that a block hash starts with `difficulty` zero hex digits
pub fn hash_meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_format() {
        assert!(is_valid_address("84ede81c58f5c490fc6e1a3035789eef897b5b35"));
        assert!(!is_valid_address("84ede81c58f5c490fc6e1a3035789eef897b5b3")); // too short
        assert!(!is_valid_address("84EDE81C58F5C490FC6E1A3035789EEF897B5B35")); // uppercase
        assert!(!is_valid_address("84ede81c58f5c490fc6e1a3035789eef897b5bzz")); // not hex
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_public_key_format() {
        let key = "a".repeat(64);
        assert!(is_valid_public_key(&key));
        assert!(!is_valid_public_key(&key[..63]));
        assert!(!is_valid_public_key(&format!("{}g", &key[..63])));
    }

    #[test]
    fn test_signature_format() {
        let valid: SignaturePair = ["1a2b".to_string(), "c3d4".to_string()];
        assert!(is_valid_signature_format(&valid));

        let empty_component: SignaturePair = ["1a2b".to_string(), String::new()];
        assert!(!is_valid_signature_format(&empty_component));

        let too_long: SignaturePair = ["f".repeat(65), "c3d4".to_string()];
        assert!(!is_valid_signature_format(&too_long));

        let uppercase: SignaturePair = ["1A2B".to_string(), "c3d4".to_string()];
        assert!(!is_valid_signature_format(&uppercase));
    }

    #[test]
    fn test_value_and_fee_ranges() {
        assert!(is_valid_transfer_value(0, 1_000));
        assert!(is_valid_transfer_value(1_000, 1_000));
        assert!(!is_valid_transfer_value(1_001, 1_000));

        assert!(is_valid_fee(0, 100));
        assert!(!is_valid_fee(101, 100));
    }

    #[test]
    fn test_date_format() {
        assert!(is_valid_date("2025-06-01T10:30:00.000Z"));
        assert!(is_valid_date("2025-06-01T10:30:00+02:00"));
        // Future dates are acceptable
        assert!(is_valid_date("2999-12-31T23:59:59.999Z"));

        assert!(!is_valid_date("2025-06-01"));
        assert!(!is_valid_date("not a date"));
        assert!(!is_valid_date(""));
    }

    #[test]
    fn test_difficulty_check() {
        assert!(hash_meets_difficulty("0000ab34", 4));
        assert!(hash_meets_difficulty("0000ab34", 0));
        assert!(!hash_meets_difficulty("000ab345", 4));
        // Difficulty beyond the hash length can never be met
        assert!(!hash_meets_difficulty("0000", 5));
    }
}
