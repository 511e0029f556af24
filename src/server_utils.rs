use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

/// Client-supplied player ids are trimmed and capped; an empty id makes
/// the whole frame undeliverable, so the caller drops it.
pub fn normalize_player_id(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(64).collect())
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_id_is_monotonic_per_prefix() {
        let first = make_id("conn");
        let second = make_id("conn");
        assert_ne!(first, second);
        assert!(first.starts_with("conn_"));
    }

    #[test]
    fn normalize_player_id_trims_and_caps() {
        assert_eq!(normalize_player_id("  alice  ").as_deref(), Some("alice"));
        assert_eq!(normalize_player_id(""), None);
        assert_eq!(normalize_player_id("   "), None);
        let long = "x".repeat(100);
        assert_eq!(normalize_player_id(&long).map(|id| id.len()), Some(64));
    }
}
