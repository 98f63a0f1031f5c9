//! Named text resources compiled into the binary.
//!
//! Callers register `include_str!` payloads under the name they are looked up by,
//! e.g. `"Shader.vert"`. Lookups never touch the filesystem.

use std::collections::HashMap;

use crate::GraphicsError;

/// Name → text table for embedded resources.
#[derive(Debug, Default, Clone)]
pub struct ResourceTable {
    entries: HashMap<&'static str, &'static str>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `text` under `name`, replacing any previous entry.
    pub fn with_text(mut self, name: &'static str, text: &'static str) -> Self {
        if self.entries.insert(name, text).is_some() {
            log::debug!("resource `{name}` registered twice; keeping the latest");
        }
        self
    }

    /// Looks up a text resource by name.
    pub fn load_text(&self, name: &str) -> Result<&'static str, GraphicsError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| GraphicsError::ResourceNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_registered_text() {
        let table = ResourceTable::new().with_text("a.txt", "alpha");
        assert_eq!(table.load_text("a.txt").unwrap(), "alpha");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let table = ResourceTable::new().with_text("a.txt", "alpha");
        let err = table.load_text("b.txt").unwrap_err();
        assert!(matches!(err, GraphicsError::ResourceNotFound(ref n) if n == "b.txt"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let table = ResourceTable::new().with_text("Shader.vert", "x");
        assert!(table.load_text("shader.vert").is_err());
    }

    #[test]
    fn later_registration_wins() {
        let table = ResourceTable::new()
            .with_text("a.txt", "first")
            .with_text("a.txt", "second");
        assert_eq!(table.len(), 1);
        assert_eq!(table.load_text("a.txt").unwrap(), "second");
    }
}
