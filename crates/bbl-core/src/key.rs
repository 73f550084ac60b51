//! # License Keys
//!
//! The license key format for Binary Baseline downloads:
//!
//! ```text
//! BB-XXXXX-XXXXX-XXXXX-CCCCC
//! ```
//!
//! Three groups of five characters are drawn from a 32-character alphabet
//! that omits the ambiguous `0`/`O` and `1`/`I`, followed by a fifth check
//! group derived from a SHA-256 digest of the random payload. The check
//! group lets support staff reject a mistyped key without a database
//! lookup. Keys are opaque capabilities, not signatures: uniqueness is
//! enforced at the persistence layer, not by the format.

use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// 32 characters, so a random byte maps onto it without modulo bias.
const ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

const PREFIX: &str = "BB";
const GROUP_LEN: usize = 5;
const RANDOM_GROUPS: usize = 3;

/// A well-formed license key.
///
/// Construction goes through [`LicenseKey::generate`] or
/// [`LicenseKey::parse`], both of which guarantee the format above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Generate a fresh key from the operating system RNG.
    ///
    /// The caller is responsible for uniqueness: on a persistence-layer
    /// collision, generate again.
    pub fn generate() -> Self {
        let mut raw = [0u8; GROUP_LEN * RANDOM_GROUPS];
        OsRng.fill_bytes(&mut raw);
        let payload: String = raw
            .iter()
            .map(|b| ALPHABET[(b % 32) as usize] as char)
            .collect();
        Self::assemble(&payload)
    }

    /// Parse and validate a key string.
    ///
    /// Checks the prefix, group structure, alphabet membership, and the
    /// check group. Returns [`ValidationError::MalformedKey`] on any
    /// mismatch.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 2 + RANDOM_GROUPS {
            return Err(ValidationError::MalformedKey(format!(
                "expected {} dash-separated groups, got {}",
                2 + RANDOM_GROUPS,
                parts.len()
            )));
        }
        if parts[0] != PREFIX {
            return Err(ValidationError::MalformedKey(format!(
                "expected prefix {PREFIX:?}, got {:?}",
                parts[0]
            )));
        }
        for group in &parts[1..] {
            if group.len() != GROUP_LEN {
                return Err(ValidationError::MalformedKey(format!(
                    "group {group:?} is not {GROUP_LEN} characters"
                )));
            }
            if let Some(c) = group.bytes().find(|b| !ALPHABET.contains(b)) {
                return Err(ValidationError::MalformedKey(format!(
                    "character {:?} is outside the key alphabet",
                    c as char
                )));
            }
        }
        let payload: String = parts[1..=RANDOM_GROUPS].concat();
        let expected = check_group(&payload);
        if parts[1 + RANDOM_GROUPS] != expected {
            return Err(ValidationError::MalformedKey(
                "check group mismatch".to_string(),
            ));
        }
        Ok(LicenseKey(s.to_string()))
    }

    /// The key as its canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn assemble(payload: &str) -> Self {
        let mut out = String::with_capacity(PREFIX.len() + (RANDOM_GROUPS + 1) * (GROUP_LEN + 1));
        out.push_str(PREFIX);
        for group in payload.as_bytes().chunks(GROUP_LEN) {
            out.push('-');
            // payload is built from ALPHABET, so groups are valid UTF-8
            out.push_str(std::str::from_utf8(group).unwrap_or_default());
        }
        out.push('-');
        out.push_str(&check_group(payload));
        LicenseKey(out)
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_group(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    digest[..GROUP_LEN]
        .iter()
        .map(|b| ALPHABET[(b % 32) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_canonical_shape() {
        let key = LicenseKey::generate();
        let s = key.as_str();
        assert_eq!(s.len(), 25);
        assert!(s.starts_with("BB-"));
        assert_eq!(s.split('-').count(), 5);
    }

    #[test]
    fn generated_keys_parse_back() {
        for _ in 0..32 {
            let key = LicenseKey::generate();
            let parsed = LicenseKey::parse(key.as_str()).unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn generated_keys_avoid_ambiguous_characters() {
        for _ in 0..32 {
            let key = LicenseKey::generate();
            for c in ['0', 'O', '1', 'I'] {
                assert!(
                    !key.as_str()[3..].contains(c),
                    "ambiguous character {c:?} in {key}"
                );
            }
        }
    }

    #[test]
    fn check_group_is_deterministic() {
        assert_eq!(check_group("ABCDEFGHJKLMNPQ"), check_group("ABCDEFGHJKLMNPQ"));
        assert_ne!(check_group("ABCDEFGHJKLMNPQ"), check_group("QABCDEFGHJKLMNP"));
    }

    #[test]
    fn rejects_wrong_prefix() {
        let key = LicenseKey::generate();
        let bad = key.as_str().replacen("BB", "XX", 1);
        assert!(matches!(
            LicenseKey::parse(&bad),
            Err(ValidationError::MalformedKey(_))
        ));
    }

    #[test]
    fn rejects_wrong_group_count() {
        assert!(LicenseKey::parse("BB-ABCDE-FGHJK-LMNPQ").is_err());
        assert!(LicenseKey::parse("").is_err());
    }

    #[test]
    fn rejects_alphabet_violations() {
        let key = LicenseKey::generate();
        let mut bad = key.as_str().to_string();
        bad.replace_range(3..4, "0");
        assert!(matches!(
            LicenseKey::parse(&bad),
            Err(ValidationError::MalformedKey(_))
        ));
    }

    #[test]
    fn rejects_tampered_check_group() {
        let key = LicenseKey::generate();
        let s = key.as_str();
        // Flip one character of the check group to a different alphabet member.
        let last = s.as_bytes()[s.len() - 1];
        let replacement = if last == b'2' { 'X' } else { '2' };
        let mut bad = s.to_string();
        bad.replace_range(s.len() - 1.., &replacement.to_string());
        assert!(matches!(
            LicenseKey::parse(&bad),
            Err(ValidationError::MalformedKey(_))
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let key = LicenseKey::generate();
        let s = key.as_str();
        let target = s.as_bytes()[4];
        let replacement = if target == b'7' { '8' } else { '7' };
        let mut bad = s.to_string();
        bad.replace_range(4..5, &replacement.to_string());
        assert!(LicenseKey::parse(&bad).is_err());
    }

    #[test]
    fn serde_is_a_transparent_string() {
        let key = LicenseKey::generate();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.as_str()));

        let back: LicenseKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn successive_keys_differ() {
        let a = LicenseKey::generate();
        let b = LicenseKey::generate();
        assert_ne!(a, b);
    }
}
