//! Entry metadata: kind, class id, state bits, timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// The single top-level storage; owns the mini stream
    Root,
    /// Storage that holds other entries
    Directory,
    /// Stream of bytes
    Document,
}

impl EntryKind {
    pub fn is_container(self) -> bool {
        matches!(self, EntryKind::Root | EntryKind::Directory)
    }
}

/// 100-nanosecond intervals between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;

/// Record fields that carry no structure
///
/// Timestamps are kept as raw FILETIME values so that files round-trip
/// bit for bit; [`EntryMetadata::created`] and [`EntryMetadata::modified`]
/// convert them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub clsid: Uuid,

    pub state_bits: u32,

    /// Creation time as a raw FILETIME (0 = not set)
    pub created_raw: u64,

    /// Modification time as a raw FILETIME (0 = not set)
    pub modified_raw: u64,
}

impl EntryMetadata {
    /// Metadata stamped with the current time (used for storages)
    pub fn now() -> Self {
        let stamp = to_filetime(Utc::now());
        EntryMetadata {
            created_raw: stamp,
            modified_raw: stamp,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        from_filetime(self.created_raw)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        from_filetime(self.modified_raw)
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.modified_raw = to_filetime(Utc::now());
    }
}

/// FILETIME to UTC time; zero and unrepresentable values mean "not set"
pub fn from_filetime(raw: u64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }
    let since_unix = i64::try_from(raw).ok()?.checked_sub(FILETIME_UNIX_OFFSET)?;
    let secs = since_unix.div_euclid(10_000_000);
    let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

/// UTC time to FILETIME, clamped at the 1601 epoch
pub fn to_filetime(time: DateTime<Utc>) -> u64 {
    let intervals = time
        .timestamp()
        .checked_mul(10_000_000)
        .and_then(|t| t.checked_add((time.timestamp_subsec_nanos() / 100) as i64))
        .and_then(|t| t.checked_add(FILETIME_UNIX_OFFSET))
        .unwrap_or(i64::MAX);
    intervals.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zero_filetime_is_unset() {
        assert!(from_filetime(0).is_none());
        assert!(EntryMetadata::default().created().is_none());
    }

    #[test]
    fn test_out_of_range_filetime_is_unset() {
        assert!(from_filetime(0x8000_0000_0000_0000).is_none());
        assert!(from_filetime(u64::MAX).is_none());
        let metadata = EntryMetadata {
            modified_raw: u64::MAX,
            ..Default::default()
        };
        assert!(metadata.modified().is_none());
    }

    #[test]
    fn test_unix_epoch() {
        let epoch = from_filetime(FILETIME_UNIX_OFFSET as u64).unwrap();
        assert_eq!(epoch.timestamp(), 0);
    }

    #[test]
    fn test_filetime_round_trip() {
        let time = Utc.with_ymd_and_hms(2008, 3, 14, 15, 9, 26).unwrap();
        let raw = to_filetime(time);
        assert_eq!(from_filetime(raw).unwrap(), time);
    }

    #[test]
    fn test_now_sets_both_stamps() {
        let metadata = EntryMetadata::now();
        assert!(metadata.created().is_some());
        assert_eq!(metadata.created_raw, metadata.modified_raw);
    }

    #[test]
    fn test_container_kinds() {
        assert!(EntryKind::Root.is_container());
        assert!(EntryKind::Directory.is_container());
        assert!(!EntryKind::Document.is_container());
    }
}
