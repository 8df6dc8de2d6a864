//! Entry kinds. Each has its own keyspace and on-disk subtree.

use std::fmt;

/// The three addressable keyspaces, plus the pseudo-kind used for
/// compressed-CAS streams received directly over the wire (it shares CAS's
/// subtree but is never itself a lookup key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Cas,
    Ac,
    Raw,
}

impl EntryKind {
    /// Directory name for this kind's subtree, e.g. `cas.v2`.
    pub fn dir_name(self) -> &'static str {
        match self {
            EntryKind::Cas => "cas.v2",
            EntryKind::Ac => "ac.v2",
            EntryKind::Raw => "raw.v2",
        }
    }

    /// Legacy (pre-migration) v1 directory name, `<kind>`.
    pub fn legacy_dir_name(self) -> &'static str {
        match self {
            EntryKind::Cas => "cas",
            EntryKind::Ac => "ac",
            EntryKind::Raw => "raw",
        }
    }

    /// Only CAS entries are hash-verified and eligible for chunked
    /// compression; AC and RAW are stored uncompressed, as-is.
    pub fn is_compressible(self) -> bool {
        matches!(self, EntryKind::Cas)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Cas => "cas",
            EntryKind::Ac => "ac",
            EntryKind::Raw => "raw",
        };
        write!(f, "{s}")
    }
}

/// The lookup key used by the LRU index: `"<kind>/<hash>"`.
pub fn lookup_key(kind: EntryKind, hash: &str) -> String {
    format!("{kind}/{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_key_shape() {
        assert_eq!(lookup_key(EntryKind::Cas, "abcd"), "cas/abcd");
        assert_eq!(lookup_key(EntryKind::Ac, "abcd"), "ac/abcd");
    }

    #[test]
    fn keyspaces_are_distinct() {
        let h = "deadbeef";
        assert_ne!(lookup_key(EntryKind::Cas, h), lookup_key(EntryKind::Ac, h));
        assert_ne!(lookup_key(EntryKind::Ac, h), lookup_key(EntryKind::Raw, h));
    }
}
