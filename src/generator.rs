//! Unique identifier, token and random byte generators.
//!
//! Every generator is safe to call concurrently from any number of
//! connection tasks. The only shared state is the cuid counter, which is
//! a relaxed atomic.
//!
//! ## Formats
//!
//! | kind   | length | layout                                             |
//! |--------|--------|----------------------------------------------------|
//! | `uuid` | 36     | random v4 UUID, lowercase, hyphenated              |
//! | `guid` | 36     | random v4 UUID, uppercase, hyphenated              |
//! | `ulid` | 26     | 48-bit ms timestamp + 80 random bits, Crockford    |
//! | `tsid` | 17     | 13 base36 nanosecond timestamp + 4 random          |
//! | `txid` | 16     | 8 base36 millisecond timestamp + 8 random          |
//! | `cuid` | 25     | `c` + timestamp(8) + counter(4) + pid(4) + rand(8) |
//! | `xuid` | 25     | random 128-bit value in base36                     |

use chrono::Utc;
use rand::rngs::OsRng;
use rand::{Rng, TryRngCore};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Largest number of bytes a single `random_bytes` call will produce.
pub const MAX_RANDOM_BYTES: usize = 4096;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// 36^4, the wrap point of the cuid counter block.
const CUID_BLOCK: u64 = 36 * 36 * 36 * 36;

static CUID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Random byte generation errors
#[derive(Debug)]
pub enum GeneratorError {
    /// The operating system entropy source failed
    EntropyUnavailable(String),
    /// More bytes were requested than `MAX_RANDOM_BYTES`
    TooLong(usize),
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::EntropyUnavailable(e) => {
                write!(f, "entropy source unavailable: {}", e)
            }
            GeneratorError::TooLong(len) => write!(
                f,
                "requested {} random bytes, limit is {}",
                len, MAX_RANDOM_BYTES
            ),
        }
    }
}

impl std::error::Error for GeneratorError {}

/// The server version string.
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Random v4 UUID, e.g. `0b5a0a3e-9d4f-4c3e-8f43-0e1c3d8f2a71`.
pub fn create_uuid() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Random v4 UUID in the upper-case form used for GUIDs.
pub fn create_guid() -> String {
    Uuid::new_v4().hyphenated().to_string().to_uppercase()
}

/// Lexicographically sortable identifier (ULID).
pub fn create_ulid() -> String {
    let millis = now_millis() & ((1 << 48) - 1);
    let entropy = rand::rng().random::<u128>() & ((1 << 80) - 1);
    encode_crockford((millis << 80) | entropy)
}

/// Timestamp id with nanosecond resolution.
pub fn create_tsid() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0).max(0) as u128;
    let mut id = encode_base36(nanos, 13);
    id.push_str(&encode_base36(rand::rng().random::<u32>() as u128, 4));
    id
}

/// Transaction id; also used to tag connections.
pub fn create_txid() -> String {
    let mut id = encode_base36(now_millis(), 8);
    id.push_str(&encode_base36(rand::rng().random::<u64>() as u128, 8));
    id
}

/// Collision-resistant id in the classic cuid layout.
pub fn create_cuid() -> String {
    let count = CUID_COUNTER.fetch_add(1, Ordering::Relaxed) % CUID_BLOCK;
    let mut rng = rand::rng();

    let mut id = String::with_capacity(25);
    id.push('c');
    id.push_str(&encode_base36(now_millis(), 8));
    id.push_str(&encode_base36(count as u128, 4));
    id.push_str(&encode_base36(std::process::id() as u128, 4));
    id.push_str(&encode_base36(rng.random::<u32>() as u128, 4));
    id.push_str(&encode_base36(rng.random::<u32>() as u128, 4));
    id
}

/// Random 128-bit id in base36.
pub fn create_xuid() -> String {
    encode_base36(Uuid::new_v4().as_u128(), 25)
}

/// Read `len` bytes from the operating system entropy source.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, GeneratorError> {
    if len > MAX_RANDOM_BYTES {
        return Err(GeneratorError::TooLong(len));
    }

    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| GeneratorError::EntropyUnavailable(e.to_string()))?;
    Ok(buf)
}

/// Render bytes as lowercase hexadecimal.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn now_millis() -> u128 {
    Utc::now().timestamp_millis().max(0) as u128
}

/// Encode the low-order `width` base36 digits of `value`, zero padded.
fn encode_base36(mut value: u128, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for slot in digits.iter_mut().rev() {
        *slot = BASE36[(value % 36) as usize];
        value /= 36;
    }
    // The alphabet is ASCII.
    String::from_utf8_lossy(&digits).into_owned()
}

/// Encode a 128-bit value as 26 Crockford base32 characters.
fn encode_crockford(mut value: u128) -> String {
    let mut digits = [b'0'; 26];
    for slot in digits.iter_mut().rev() {
        *slot = CROCKFORD[(value & 0x1f) as usize];
        value >>= 5;
    }
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_base36(s: &str) -> bool {
        s.bytes().all(|b| BASE36.contains(&b))
    }

    #[test]
    fn test_version_matches_package() {
        assert_eq!(version(), "18.12.21");
    }

    #[test]
    fn test_uuid_format() {
        let id = create_uuid();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(&id[14..15], "4");
    }

    #[test]
    fn test_guid_format() {
        let id = create_guid();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_uppercase());
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn test_ulid_format() {
        let id = create_ulid();
        assert_eq!(id.len(), 26);
        assert!(id.bytes().all(|b| CROCKFORD.contains(&b)));
        // 130 bits of room for 128 bits of data
        assert!(id.as_bytes()[0] <= b'7');
    }

    #[test]
    fn test_ulid_sorts_by_time() {
        let earlier = create_ulid();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = create_ulid();
        assert!(earlier[..10] < later[..10]);
    }

    #[test]
    fn test_fixed_width_base36_ids() {
        for (id, len) in [
            (create_tsid(), 17),
            (create_txid(), 16),
            (create_cuid(), 25),
            (create_xuid(), 25),
        ] {
            assert_eq!(id.len(), len, "{}", id);
            assert!(is_base36(&id), "{}", id);
        }
    }

    #[test]
    fn test_cuid_prefix_and_counter() {
        let a = create_cuid();
        let b = create_cuid();
        assert!(a.starts_with('c'));
        assert_ne!(a[9..13], b[9..13]);
    }

    #[test]
    fn test_txid_uniqueness() {
        let ids: HashSet<String> = (0..10_000).map(|_| create_txid()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_random_bytes() {
        let bytes = random_bytes(24).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_ne!(bytes, random_bytes(24).unwrap());

        assert!(random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_random_bytes_limit() {
        assert!(random_bytes(MAX_RANDOM_BYTES).is_ok());
        match random_bytes(MAX_RANDOM_BYTES + 1) {
            Err(GeneratorError::TooLong(n)) => assert_eq!(n, MAX_RANDOM_BYTES + 1),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab, 0xff]), "000fabff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_encode_base36() {
        assert_eq!(encode_base36(0, 4), "0000");
        assert_eq!(encode_base36(35, 2), "0z");
        assert_eq!(encode_base36(36, 2), "10");
        // keeps the low-order digits only
        assert_eq!(encode_base36(36 * 36, 2), "00");
    }
}
