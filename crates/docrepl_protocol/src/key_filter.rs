//! Key prefix rules for records that must not be replicated.

/// Prefixes of internal records that stay on the node that wrote them.
pub const SYSTEM_KEY_PREFIXES: &[&[u8]] = &[b"system/"];

/// Sub-prefixes of [`SYSTEM_KEY_PREFIXES`] that are replicated anyway.
///
/// Hi/lo key-range reservations have to reach every node, otherwise two
/// nodes could hand out the same identifiers.
pub const REPLICATED_SYSTEM_PREFIXES: &[&[u8]] = &[b"system/hilo/"];

/// Decides from its key whether a record is local-only.
///
/// Matching is an ASCII case-insensitive prefix test against two tables: a
/// key is skipped when it starts with an excluded prefix and does not start
/// with any of the re-included prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    excluded: Vec<Vec<u8>>,
    included: Vec<Vec<u8>>,
}

impl KeyFilter {
    /// Creates a filter from explicit prefix tables.
    pub fn new<E, I>(excluded: E, included: I) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<[u8]>,
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Self {
            excluded: excluded.into_iter().map(|p| p.as_ref().to_vec()).collect(),
            included: included.into_iter().map(|p| p.as_ref().to_vec()).collect(),
        }
    }

    /// The filter for internal system records.
    pub fn system() -> Self {
        Self::new(SYSTEM_KEY_PREFIXES, REPLICATED_SYSTEM_PREFIXES)
    }

    /// A filter that lets every key through.
    pub fn allow_all() -> Self {
        Self::new(Vec::<Vec<u8>>::new(), Vec::<Vec<u8>>::new())
    }

    /// Returns true if the record with this key must not be shipped.
    pub fn should_skip(&self, key: &[u8]) -> bool {
        self.excluded.iter().any(|p| has_prefix(key, p))
            && !self.included.iter().any(|p| has_prefix(key, p))
    }
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self::system()
    }
}

fn has_prefix(key: &[u8], prefix: &[u8]) -> bool {
    key.len() >= prefix.len() && key[..prefix.len()].eq_ignore_ascii_case(prefix)
}
