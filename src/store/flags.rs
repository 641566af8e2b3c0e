//! Typed bitmask for the packed `task.flags` column.
//!
//! Each task record carries completion bits (`FETCHED`, `PROCESSED`), an
//! origin tag (`RAW_FETCHER` | `URL_FETCHER` | `ZIP_FETCHER`), a
//! payload-location tag (`FILE` | `MEMORY`) and `DUPLICATE`. The integer
//! representation is what gets stored; this wrapper gives the rest of the
//! crate named predicates instead of raw bit arithmetic.

use std::fmt;

/// Bitmask of pipeline state flags for a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags(i64);

impl TaskFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// Payload has been fetched successfully.
    pub const FETCHED: Self = Self(1);
    /// The record has been consumed by its downstream stage.
    pub const PROCESSED: Self = Self(1 << 1);
    /// Origin: plain content fetch.
    pub const RAW_FETCHER: Self = Self(1 << 2);
    /// Origin: URL-discovery fetch (intermediate, never processed).
    pub const URL_FETCHER: Self = Self(1 << 3);
    /// Origin: archive fetch (expanded, never processed directly).
    pub const ZIP_FETCHER: Self = Self(1 << 4);
    /// Payload location: the locator names a file on disk.
    pub const FILE: Self = Self(1 << 5);
    /// Payload location: an in-memory table supplied by the plugin.
    pub const MEMORY: Self = Self(1 << 6);
    /// Payload is a cross-reference to a byte-identical earlier record.
    pub const DUPLICATE: Self = Self(1 << 7);

    /// Builds flags from the stored integer column value.
    #[must_use]
    pub fn from_bits(bits: i64) -> Self {
        Self(bits)
    }

    /// Returns the integer value stored in the database.
    #[must_use]
    pub fn bits(self) -> i64 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set in `self`.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of the two masks.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with the bits of `other` cleared.
    #[must_use]
    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True if the payload has been fetched.
    #[must_use]
    pub fn is_fetched(self) -> bool {
        self.contains(Self::FETCHED)
    }

    /// True if the record has been consumed by its downstream stage.
    #[must_use]
    pub fn is_processed(self) -> bool {
        self.contains(Self::PROCESSED)
    }

    /// True if the payload cross-references an earlier identical record.
    #[must_use]
    pub fn is_duplicate(self) -> bool {
        self.contains(Self::DUPLICATE)
    }

    /// True if the locator names a file holding the payload.
    #[must_use]
    pub fn is_file(self) -> bool {
        self.contains(Self::FILE)
    }

    /// True if the payload lives in the plugin's in-memory table.
    #[must_use]
    pub fn is_memory(self) -> bool {
        self.contains(Self::MEMORY)
    }
}

impl std::ops::BitOr for TaskFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for TaskFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TaskFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TaskFlags, &str); 8] = [
            (TaskFlags::FETCHED, "fetched"),
            (TaskFlags::PROCESSED, "processed"),
            (TaskFlags::RAW_FETCHER, "raw_fetcher"),
            (TaskFlags::URL_FETCHER, "url_fetcher"),
            (TaskFlags::ZIP_FETCHER, "zip_fetcher"),
            (TaskFlags::FILE, "file"),
            (TaskFlags::MEMORY, "memory"),
            (TaskFlags::DUPLICATE, "duplicate"),
        ];

        if self.0 == 0 {
            return write!(f, "empty");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
