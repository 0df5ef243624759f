// ===============================
// src/slot.rs (signed tick <-> on-chain slot id)
// ===============================
//
// Ticks are signed; the pool addresses per-tick storage by an unsigned slot id.
// slot = tick + SLOT_OFFSET, storage key = b"slot:" ++ be8(slot).
// Out-of-range ticks are rejected, never clamped.
//
use crate::error::{Result, SeedError};

pub const SLOT_OFFSET: i64 = 10_000;
pub const MIN_TICK: i64 = -SLOT_OFFSET;
pub const MAX_TICK: i64 = SLOT_OFFSET;

pub const KEY_PREFIX: &[u8] = b"slot:";
pub const KEY_LEN: usize = 5 + 8;

fn invalid(tick: i64) -> SeedError {
    SeedError::InvalidTick { tick, min: MIN_TICK, max: MAX_TICK }
}

pub fn encode(tick: i64) -> Result<u64> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(invalid(tick));
    }
    Ok((tick + SLOT_OFFSET) as u64)
}

pub fn decode(slot: u64) -> Result<i64> {
    let max_slot = (MAX_TICK + SLOT_OFFSET) as u64;
    if slot > max_slot {
        // report the tick the slot would have named
        return Err(invalid(i64::try_from(slot).unwrap_or(i64::MAX).saturating_sub(SLOT_OFFSET)));
    }
    Ok(slot as i64 - SLOT_OFFSET)
}

pub fn storage_key(tick: i64) -> Result<Vec<u8>> {
    let slot = encode(tick)?;
    let mut key = Vec::with_capacity(KEY_LEN);
    key.extend_from_slice(KEY_PREFIX);
    key.extend_from_slice(&slot.to_be_bytes());
    Ok(key)
}

/// Inverse of [`storage_key`]; `None` for anything that is not a slot key.
pub fn tick_from_storage_key(key: &[u8]) -> Option<i64> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let bytes: [u8; 8] = rest.try_into().ok()?;
    decode(u64::from_be_bytes(bytes)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn round_trip_over_full_range() {
        for tick in MIN_TICK..=MAX_TICK {
            let slot = encode(tick).unwrap();
            assert_eq!(decode(slot).unwrap(), tick);
        }
    }

    #[test]
    fn encode_is_strictly_monotonic() {
        let mut prev = encode(MIN_TICK).unwrap();
        assert_eq!(prev, 0);
        for tick in (MIN_TICK + 1)..=MAX_TICK {
            let cur = encode(tick).unwrap();
            assert!(cur > prev, "tick {tick} did not increase slot");
            prev = cur;
        }
    }

    #[test]
    fn storage_keys_are_unique_and_parse_back() {
        let mut seen = HashSet::new();
        for tick in MIN_TICK..=MAX_TICK {
            let key = storage_key(tick).unwrap();
            assert_eq!(key.len(), KEY_LEN);
            assert_eq!(tick_from_storage_key(&key), Some(tick));
            assert!(seen.insert(key), "duplicate key for tick {tick}");
        }
    }

    #[test]
    fn center_key_layout() {
        let key = storage_key(0).unwrap();
        assert_eq!(&key[..5], b"slot:");
        assert_eq!(&key[5..], &10_000u64.to_be_bytes());
    }

    #[test]
    fn out_of_range_ticks_are_rejected() {
        for tick in [MIN_TICK - 1, MAX_TICK + 1, i64::MIN, i64::MAX] {
            match encode(tick) {
                Err(SeedError::InvalidTick { tick: t, min, max }) => {
                    assert_eq!(t, tick);
                    assert_eq!((min, max), (MIN_TICK, MAX_TICK));
                }
                other => panic!("expected InvalidTick, got {other:?}"),
            }
            assert!(storage_key(tick).is_err());
        }
        assert!(decode(20_001).is_err());
        assert!(tick_from_storage_key(b"slot:").is_none());
        assert!(tick_from_storage_key(b"pool:\0\0\0\0\0\0\0\0").is_none());
    }
}
