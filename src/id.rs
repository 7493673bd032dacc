//! ID generation utilities for datachat
//!
//! Provides identifiers for conversations, scratch directories and stored artifacts.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Random lowercase hex string of `len` characters
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let nibble: u8 = rng.random_range(0..16);
            char::from_digit(nibble as u32, 16).unwrap_or('0')
        })
        .collect()
}

/// Generate a conversation ID
///
/// Format: `conv-{timestamp_ms}-{random_hex}`
/// Example: `conv-1738300800123-a1b2c3d4`
pub fn generate_conversation_id() -> String {
    format!("conv-{}-{}", now_ms(), random_hex(8))
}

/// Generate a scratch directory name for one execution
///
/// Format: `agent_artifacts_{timestamp_ms}_{random_hex}`
pub fn generate_scratch_name() -> String {
    format!("agent_artifacts_{}_{}", now_ms(), random_hex(12))
}

/// Generate the storage key for an artifact produced in a conversation
///
/// Format: `artifacts/{scope_id}/{random_hex8}_{file_name}`
pub fn generate_artifact_key(scope_id: &str, file_name: &str) -> String {
    format!("artifacts/{}/{}_{}", scope_id, random_hex(8), file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_random_hex_length_and_alphabet() {
        let hex = random_hex(8);
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_conversation_id_format() {
        let id = generate_conversation_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "conv");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_generate_scratch_name_uniqueness() {
        let a = generate_scratch_name();
        let b = generate_scratch_name();
        assert!(a.starts_with("agent_artifacts_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_artifact_key_format() {
        let key = generate_artifact_key("c1", "plot.png");
        let parts: Vec<&str> = key.splitn(3, '/').collect();
        assert_eq!(parts[0], "artifacts");
        assert_eq!(parts[1], "c1");
        let (suffix, name) = parts[2].split_once('_').unwrap();
        assert_eq!(suffix.len(), 8);
        assert_eq!(name, "plot.png");
    }
}
