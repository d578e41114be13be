//! Version stamps for mutable market objects.
//!
//! Objects whose state can change after construction (curves that are bumped
//! and re-fitted in place) carry a monotonically increasing [`Version`].
//! Consumers that cache derived results record the versions they were
//! computed against and compare them later, instead of relying on a
//! notification being delivered at the right moment.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A generation counter value.  Larger means newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u64);

impl Version {
    /// The version every object starts from.
    pub const INITIAL: Version = Version(0);

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An object that exposes its current [`Version`].
pub trait Versioned {
    /// The version of the object's current state.
    fn version(&self) -> Version;
}

/// Thread-safe version counter to embed in mutable objects.
///
/// Mutating methods call [`bump`](VersionCounter::bump) after the state
/// change is complete.
#[derive(Debug, Default)]
pub struct VersionCounter {
    value: AtomicU64,
}

impl VersionCounter {
    /// Create a counter at [`Version::INITIAL`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version.
    pub fn current(&self) -> Version {
        Version(self.value.load(Ordering::Acquire))
    }

    /// Advance the counter and return the new version.
    pub fn bump(&self) -> Version {
        Version(self.value.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

impl Clone for VersionCounter {
    fn clone(&self) -> Self {
        Self {
            value: AtomicU64::new(self.value.load(Ordering::Acquire)),
        }
    }
}

/// A snapshot of the versions of a sequence of inputs.
///
/// `first_changed` returns the index of the first input whose version moved,
/// which is exactly the `min_index` a selective re-fit needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSnapshot {
    versions: Vec<Version>,
}

impl VersionSnapshot {
    /// Capture the versions of `items`.
    pub fn capture<'a, I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: Versioned + ?Sized + 'a,
    {
        Self {
            versions: items.into_iter().map(Versioned::version).collect(),
        }
    }

    /// Build a snapshot from already collected versions.
    pub fn from_versions(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            versions: versions.into_iter().collect(),
        }
    }

    /// Number of recorded versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// `true` if no versions were recorded.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Index of the first entry that differs from `other`, if any.
    ///
    /// A length mismatch counts as a change at the shorter length.
    pub fn first_changed(&self, other: &VersionSnapshot) -> Option<usize> {
        let common = self.versions.len().min(other.versions.len());
        self.versions[..common]
            .iter()
            .zip(&other.versions[..common])
            .position(|(a, b)| a != b)
            .or_else(|| (self.versions.len() != other.versions.len()).then_some(common))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(VersionCounter);

    impl Versioned for Item {
        fn version(&self) -> Version {
            self.0.current()
        }
    }

    #[test]
    fn bump_advances_version() {
        let c = VersionCounter::new();
        assert_eq!(c.current(), Version::INITIAL);
        let v = c.bump();
        assert_eq!(v, c.current());
        assert!(v > Version::INITIAL);
    }

    #[test]
    fn snapshot_detects_first_change() {
        let items: Vec<Item> = (0..4).map(|_| Item(VersionCounter::new())).collect();
        let before = VersionSnapshot::capture(&items);
        assert_eq!(before.first_changed(&VersionSnapshot::capture(&items)), None);

        items[2].0.bump();
        items[3].0.bump();
        let after = VersionSnapshot::capture(&items);
        assert_eq!(before.first_changed(&after), Some(2));
    }

    #[test]
    fn snapshot_length_change_is_a_change() {
        let items: Vec<Item> = (0..3).map(|_| Item(VersionCounter::new())).collect();
        let full = VersionSnapshot::capture(&items);
        let short = VersionSnapshot::capture(&items[..2]);
        assert_eq!(full.first_changed(&short), Some(2));
    }
}
