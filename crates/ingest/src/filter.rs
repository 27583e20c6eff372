use librarian_config::FilterConfig;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Component, Path};

/// Names that are never ingested: sync tool markers, OS thumbnails, trash.
///
/// Matching is by name, never by extension. Prefix and exact-name rules apply
/// to every component of the inbox-relative path, so anything inside a
/// `.thumbnails/` or `.stversions/` folder is skipped too. Patterns only apply
/// to the file name.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    prefixes: Vec<String>,
    names: Vec<String>,
    patterns: Vec<Regex>,
}
impl DenyList {
    pub fn new(prefixes: Vec<String>, names: Vec<String>, patterns: Vec<Regex>) -> Self {
        Self { prefixes, names, patterns }
    }

    pub fn from_config(config: &FilterConfig) -> librarian_config::error::Result<Self> {
        Ok(Self::new(config.prefixes.clone(), config.names.clone(), config.compiled_patterns()?))
    }

    /// Whether `path` (relative to the inbox root) should be left alone.
    pub fn is_denied(&self, path: &Path) -> bool {
        let components = path.components().filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        });
        let mut file_name = None;
        for component in components {
            if self.denies_component(component) {
                return true;
            }
            file_name = Some(component);
        }
        file_name.map(OsStr::to_string_lossy).is_some_and(|name| self.patterns.iter().any(|re| re.is_match(&name)))
    }

    fn denies_component(&self, component: &OsStr) -> bool {
        let component = component.to_string_lossy();
        self.prefixes.iter().any(|prefix| component.starts_with(prefix.as_str()))
            || self.names.iter().any(|name| component == name.as_str())
    }
}
