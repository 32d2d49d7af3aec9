//! Path filters applied while walking the project tree.

use std::path::Path;

use crate::config::Layout;

/// Decides whether a path, relative to the walked root, goes into the archive.
///
/// Directories are checked too; a rejected directory is not descended into.
pub trait PathFilter {
    fn include(&self, rel: &Path) -> bool;
}

impl<F> PathFilter for F
where
    F: Fn(&Path) -> bool,
{
    fn include(&self, rel: &Path) -> bool {
        self(rel)
    }
}

/// Accepts everything (used for the cache tree)
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl PathFilter for IncludeAll {
    fn include(&self, _rel: &Path) -> bool {
        true
    }
}

/// Rejects hidden components and build-intermediate directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeRules {
    /// Components starting with this prefix are hidden (empty disables)
    pub hidden_prefix: String,
    /// Component names that mark build intermediates
    pub excluded_names: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self::from_layout(&Layout::default())
    }
}

impl ExcludeRules {
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            hidden_prefix: layout.hidden_prefix.clone(),
            excluded_names: layout.exclude_dirs.clone(),
        }
    }

    fn rejects_component(&self, name: &str) -> bool {
        (!self.hidden_prefix.is_empty() && name.starts_with(&self.hidden_prefix))
            || self.excluded_names.iter().any(|n| n == name)
    }
}

impl PathFilter for ExcludeRules {
    fn include(&self, rel: &Path) -> bool {
        !rel.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| self.rejects_component(name))
        })
    }
}
