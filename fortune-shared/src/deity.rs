//! Deity-to-temple mapping (spec §6): a fixed, finite injection from the
//! `deity_id` a client submits to the `temple` name the vector store indexes
//! by. Loading the backing data is out of scope here; this just holds and
//! resolves whatever table the caller supplies.

use std::collections::HashMap;

use crate::errors::FortuneError;

/// An injected `deity_id -> temple` lookup table.
#[derive(Debug, Clone, Default)]
pub struct DeityMap {
    table: HashMap<String, String>,
}

impl DeityMap {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    /// Resolve a `deity_id` to its temple name, or `InvalidInput` if the
    /// core has no mapping for it (spec §4.8 step 1, §6 Rejections).
    pub fn resolve(&self, deity_id: &str) -> Result<&str, FortuneError> {
        self.table
            .get(deity_id)
            .map(String::as_str)
            .ok_or_else(|| FortuneError::InvalidInput(format!("unknown deity: {deity_id}")))
    }

    pub fn is_known(&self, deity_id: &str) -> bool {
        self.table.contains_key(deity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    fn sample_map() -> DeityMap {
        DeityMap::new(HashMap::from([
            ("guan_yin".to_string(), "guan_yin_temple".to_string()),
            ("mazu".to_string(), "mazu_temple".to_string()),
        ]))
    }

    #[test]
    fn resolves_known_deity() {
        let map = sample_map();
        assert_eq!(map.resolve("guan_yin").unwrap(), "guan_yin_temple");
    }

    #[test]
    fn unknown_deity_is_invalid_input() {
        let map = sample_map();
        let err = map.resolve("zeus").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
    }

    #[test]
    fn is_known_reflects_table_membership() {
        let map = sample_map();
        assert!(map.is_known("mazu"));
        assert!(!map.is_known("zeus"));
    }
}
