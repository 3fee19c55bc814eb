//! Folder → carousel section lookup.

use std::collections::BTreeMap;

use crate::config::SectionConfig;

/// Maps gallery folders (e.g. "2025-06") to the carousel section they are displayed in.
#[derive(Debug, Clone, Default)]
pub struct SectionTable {
    sections: BTreeMap<String, SectionConfig>,
}

impl SectionTable {
    pub fn new(sections: BTreeMap<String, SectionConfig>) -> Self {
        Self { sections }
    }

    pub fn resolve(&self, folder: &str) -> Option<&SectionConfig> {
        self.sections.get(folder)
    }

    /// Known folders in sorted order, for error messages
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

impl From<&BTreeMap<String, SectionConfig>> for SectionTable {
    fn from(sections: &BTreeMap<String, SectionConfig>) -> Self {
        Self::new(sections.clone())
    }
}
