use std::fmt;

/// Sentinel value marking an absent hash inside a [`PathSpec`].
pub const EMPTY_HASH: u32 = 0xFFFF_FFFF;

/// Hashes a path fragment the way the game's loader does: lowercase the text
/// and take the bitwise complement of its IEEE CRC-32.
pub fn sqpack_hash(text: &str) -> u32 {
    !crc32fast::hash(text.to_ascii_lowercase().as_bytes())
}

/// An addressing value for one archive entry.
///
/// An entry can be addressed by the `(folder_hash, name_hash)` component pair,
/// by the hash of the full path, or by both. Hashes that are not known carry
/// [`EMPTY_HASH`]; at least one of the two key kinds is always present on a
/// spec produced by the constructors here.
#[derive(Debug, Clone)]
pub struct PathSpec {
    /// The textual path this spec was derived from, when one is known.
    /// Slashes are normalized, case is preserved. Purely diagnostic.
    pub path: Option<String>,
    pub folder_hash: u32,
    pub name_hash: u32,
    pub full_path_hash: u32,
}

impl PathSpec {
    /// Builds a spec from a textual game path such as `common/font/font1.tex`.
    ///
    /// Backslashes count as separators. A path without any separator hashes
    /// as a full path only; the component pair stays absent.
    pub fn from_path(path: &str) -> Self {
        let normalized = path.replace('\\', "/");
        let (folder_hash, name_hash) = match normalized.rfind('/') {
            Some(pos) => (
                sqpack_hash(&normalized[..pos]),
                sqpack_hash(&normalized[pos + 1..]),
            ),
            None => (EMPTY_HASH, EMPTY_HASH),
        };

        Self {
            full_path_hash: sqpack_hash(&normalized),
            path: Some(normalized),
            folder_hash,
            name_hash,
        }
    }

    /// Builds a spec from an index1-style component pair.
    pub fn from_component_hashes(folder_hash: u32, name_hash: u32) -> Self {
        Self {
            path: None,
            folder_hash,
            name_hash,
            full_path_hash: EMPTY_HASH,
        }
    }

    /// Builds a spec from an index2-style full path hash.
    pub fn from_full_hash(full_path_hash: u32) -> Self {
        Self {
            path: None,
            folder_hash: EMPTY_HASH,
            name_hash: EMPTY_HASH,
            full_path_hash,
        }
    }

    pub fn has_component_hash(&self) -> bool {
        self.folder_hash != EMPTY_HASH && self.name_hash != EMPTY_HASH
    }

    pub fn has_full_path_hash(&self) -> bool {
        self.full_path_hash != EMPTY_HASH
    }

    /// The `(folder_hash, name_hash)` lookup key.
    pub fn component_key(&self) -> (u32, u32) {
        (self.folder_hash, self.name_hash)
    }

    /// The full path hash lookup key.
    pub fn full_key(&self) -> u32 {
        self.full_path_hash
    }

    /// Merges hashes that `other` knows and `self` does not.
    ///
    /// Fields already present are left untouched. Used when an ingester
    /// discovers additional identifiers for an entry that is already
    /// interned, e.g. an index2 record for an index1-derived entry.
    pub fn update(&mut self, other: &PathSpec) {
        if self.folder_hash == EMPTY_HASH {
            self.folder_hash = other.folder_hash;
        }
        if self.name_hash == EMPTY_HASH {
            self.name_hash = other.name_hash;
        }
        if self.full_path_hash == EMPTY_HASH {
            self.full_path_hash = other.full_path_hash;
        }
        if self.path.is_none() {
            self.path = other.path.clone();
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => f.write_str(path),
            None => write!(
                f,
                "{:08x}:{:08x}:{:08x}",
                self.folder_hash, self.name_hash, self.full_path_hash
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_crc32_jamcrc() {
        // CRC-32/JAMCRC check value for "123456789".
        assert_eq!(sqpack_hash("123456789"), 0x340B_C6D9);
    }

    #[test]
    fn hash_is_case_and_separator_insensitive() {
        assert_eq!(sqpack_hash("Common/Font"), sqpack_hash("common/font"));
        assert_eq!(
            PathSpec::from_path("Common\\Font\\font1.tex").full_path_hash,
            PathSpec::from_path("common/font/font1.tex").full_path_hash,
        );
    }

    #[test]
    fn from_path_splits_at_last_separator() {
        let spec = PathSpec::from_path("common/font/font1.tex");
        assert!(spec.has_component_hash());
        assert!(spec.has_full_path_hash());
        assert_eq!(spec.folder_hash, sqpack_hash("common/font"));
        assert_eq!(spec.name_hash, sqpack_hash("font1.tex"));
        assert_eq!(spec.full_path_hash, sqpack_hash("common/font/font1.tex"));
    }

    #[test]
    fn from_path_without_separator_has_no_component_key() {
        let spec = PathSpec::from_path("root.exl");
        assert!(!spec.has_component_hash());
        assert!(spec.has_full_path_hash());
    }

    #[test]
    fn update_fills_only_absent_fields() {
        let mut spec = PathSpec::from_component_hashes(1, 2);
        spec.update(&PathSpec::from_path("common/font/font1.tex"));

        assert_eq!(spec.folder_hash, 1);
        assert_eq!(spec.name_hash, 2);
        assert_eq!(
            spec.full_path_hash,
            sqpack_hash("common/font/font1.tex")
        );
        assert_eq!(spec.path.as_deref(), Some("common/font/font1.tex"));
    }
}
