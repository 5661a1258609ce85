//! Identity helpers shared by every vendor adaptor: SHA-256 hashing of
//! personal data, cookie lookup and event identifier generation.

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const EVENT_ID_SUFFIX_LEN: usize = 9;

/// Lowercase hex SHA-256 digest (always 64 characters).
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keep only ASCII digits.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Hashed, normalized email. Blank input is unknown and yields `None`.
pub fn hash_email(email: &str) -> Option<String> {
    hash_non_empty(&normalize_email(email))
}

/// Hashed phone number (digits only). Blank input yields `None`.
pub fn hash_phone(phone: &str) -> Option<String> {
    hash_non_empty(&normalize_phone(phone))
}

/// Hashed free-text PII (names, city, state, zip) after trim + lowercase.
pub fn hash_text(value: &str) -> Option<String> {
    hash_non_empty(&value.trim().to_lowercase())
}

fn hash_non_empty(normalized: &str) -> Option<String> {
    if normalized.is_empty() {
        None
    } else {
        Some(sha256_hex(normalized))
    }
}

/// Look up a cookie in a raw `Cookie` header.
///
/// Only a single occurrence of `name` yields a value; a missing or repeated
/// cookie returns `""`.
pub fn read_cookie(cookie_header: &str, name: &str) -> String {
    let haystack = format!("; {cookie_header}");
    let needle = format!("; {name}=");
    let parts: Vec<&str> = haystack.split(needle.as_str()).collect();
    if parts.len() == 2 {
        parts[1].split(';').next().unwrap_or_default().to_string()
    } else {
        String::new()
    }
}

/// `event_<unix millis>_<9 base36 chars>`. Collisions are extremely
/// unlikely but not impossible.
pub fn generate_event_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..EVENT_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("event_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
