//! Shared type definitions for the stitch crate
//!
//! Identifiers and byte ranges that every pipeline stage passes around. Keeping
//! them here avoids import cycles between the parser adapter and the later
//! stages, which must never see parser-specific types.

use std::fmt;

/// Stable identifier of a source file inside the [`FileRegistry`] arena.
///
/// Ids are handed out in discovery order and renumbered once after loading, so
/// the numeric value doubles as the deterministic tie-break key.
///
/// [`FileRegistry`]: crate::file_registry::FileRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value of the FileId
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a declared symbol within one file.
///
/// Two identifier occurrences share a `SymbolId` exactly when scope resolution
/// says they denote the same declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Index into the binder's binding table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u32);

impl BindingId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Half-open byte range `[start, end)` into a file's original source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width range used for insertions
    pub const fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn contains_range(&self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_containment() {
        let outer = TextRange::new(4, 20);
        assert!(outer.contains_range(TextRange::new(4, 20)));
        assert!(outer.contains_range(TextRange::empty(10)));
        assert!(!outer.contains_range(TextRange::new(3, 8)));
        assert_eq!(outer.len(), 16);
        assert!(TextRange::empty(7).is_empty());
    }

    #[test]
    fn test_file_id_ordering_follows_discovery() {
        let first = FileId::new(0);
        let second = FileId::new(1);
        assert!(first < second);
        assert_eq!(second.index(), 1);
        assert_eq!(second.to_string(), "#1");
    }
}
