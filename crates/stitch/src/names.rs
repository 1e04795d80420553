//! Generated variable names
//!
//! All names share one configurable prefix and derive from stable ids, so the
//! same project always produces the same names.

use crate::types::FileId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAllocator {
    prefix: String,
}

impl NameAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Variable holding a file's exports, or its accessor when circular
    pub fn file_var(&self, id: FileId) -> String {
        format!("{}{}", self.prefix, id.as_u32())
    }

    /// Live export storage behind a circular file's accessor
    pub fn circular_storage(&self, id: FileId) -> String {
        format!("{}{}_exports", self.prefix, id.as_u32())
    }

    /// Closure parameter bound to a global module
    pub fn global_module(&self, index: usize) -> String {
        format!("{}mod_{}", self.prefix, index)
    }

    /// In-closure variable for `exports` and `this`
    pub fn exports_var(&self) -> String {
        format!("{}exports", self.prefix)
    }

    /// In-closure variable for `module.exports` when it needs its own slot
    pub fn module_exports_var(&self) -> String {
        format!("{}moduleExports", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_prefixed_and_distinct() {
        let names = NameAllocator::new("__small$_");
        let id = FileId::new(3);

        assert_eq!(names.file_var(id), "__small$_3");
        assert_eq!(names.circular_storage(id), "__small$_3_exports");
        assert_eq!(names.global_module(0), "__small$_mod_0");
        assert_eq!(names.exports_var(), "__small$_exports");
        assert_eq!(names.module_exports_var(), "__small$_moduleExports");
    }
}
