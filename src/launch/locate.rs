//! Finding the runner, the project configuration and the cache directory in
//! an extracted tree.
//!
//! Every lookup is a [`SearchStrategy`]: an ordered list of candidate
//! relative paths, optionally followed by one bounded recursive scan.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Layout;

use super::LaunchError;

/// Depth limit of the recursive fallback scan
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Kind of filesystem entry a strategy is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    fn matches(self, path: &Path) -> bool {
        match self {
            EntryKind::File => path.is_file(),
            EntryKind::Dir => path.is_dir(),
        }
    }
}

type NamePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Ordered candidates first, then an optional recursive scan by file name
pub struct SearchStrategy {
    kind: EntryKind,
    candidates: Vec<PathBuf>,
    fallback: Option<NamePredicate>,
    max_depth: usize,
}

impl std::fmt::Debug for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchStrategy")
            .field("kind", &self.kind)
            .field("candidates", &self.candidates)
            .field("fallback", &self.fallback.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl SearchStrategy {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            candidates: Vec::new(),
            fallback: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Add a candidate relative path; duplicates are ignored
    pub fn candidate(mut self, rel: impl Into<PathBuf>) -> Self {
        let rel = rel.into();
        if !self.candidates.contains(&rel) {
            self.candidates.push(rel);
        }
        self
    }

    /// Scan the tree for an entry whose file name satisfies `predicate`
    pub fn fallback<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(predicate));
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Absolute locations probed before the recursive scan (for diagnostics)
    pub fn searched_locations(&self, root: &Path) -> Vec<PathBuf> {
        self.candidates.iter().map(|rel| root.join(rel)).collect()
    }

    pub fn search(&self, root: &Path) -> Option<PathBuf> {
        for rel in &self.candidates {
            let path = root.join(rel);
            if self.kind.matches(&path) {
                return Some(path);
            }
        }

        let predicate = self.fallback.as_ref()?;
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| match self.kind {
                EntryKind::File => entry.file_type().is_file(),
                EntryKind::Dir => entry.file_type().is_dir(),
            })
            .find(|entry| entry.file_name().to_str().is_some_and(|name| predicate(name)))
            .map(|entry| entry.into_path())
    }
}

fn runner_file_names(name: &str) -> Vec<String> {
    let mut names = vec![format!("{name}{}", std::env::consts::EXE_SUFFIX)];
    for alt in [name.to_string(), format!("{name}.exe")] {
        if !names.contains(&alt) {
            names.push(alt);
        }
    }
    names
}

/// Runner: root then `bin/`, platform suffix first, then any file with the
/// runner's name anywhere in the tree
pub fn runner_strategy(layout: &Layout) -> SearchStrategy {
    let names = runner_file_names(&layout.runner_name);
    let mut strategy = SearchStrategy::new(EntryKind::File);
    for name in &names {
        strategy = strategy.candidate(name);
    }
    for name in &names {
        strategy = strategy.candidate(Path::new("bin").join(name));
    }
    strategy.fallback(move |file_name| names.iter().any(|n| n == file_name))
}

/// Configuration file: inside the project directory, at the root, then the
/// first file with that name anywhere in the tree
pub fn config_strategy(layout: &Layout) -> SearchStrategy {
    let config_file = layout.config_file.clone();
    SearchStrategy::new(EntryKind::File)
        .candidate(Path::new(&layout.project_dir).join(&layout.config_file))
        .candidate(&layout.config_file)
        .fallback(move |file_name| file_name == config_file)
}

/// Cache directory: the configured name, and the same name without a
/// leading dot. No recursive scan.
pub fn cache_strategy(layout: &Layout) -> SearchStrategy {
    let strategy = SearchStrategy::new(EntryKind::Dir).candidate(&layout.cache_dir);
    match layout.cache_dir.strip_prefix('.') {
        Some(undotted) if !undotted.is_empty() => strategy.candidate(undotted),
        _ => strategy,
    }
}

/// Members found in an extracted payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMembers {
    pub runner: PathBuf,
    pub config: PathBuf,
    pub cache_dir: Option<PathBuf>,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Locate the runner (required), configuration (required) and cache
/// directory (optional) under `root`
pub fn locate_members(root: &Path, layout: &Layout) -> Result<PayloadMembers, LaunchError> {
    tracing::info!("Locating runner executable");
    let strategy = runner_strategy(layout);
    let runner = strategy.search(root).ok_or_else(|| {
        let searched = strategy.searched_locations(root);
        tracing::error!(
            searched = %display_paths(&searched),
            "Runner executable not found in extracted payload"
        );
        LaunchError::RunnerNotFound {
            name: layout.runner_name.clone(),
            root: root.to_path_buf(),
            searched,
        }
    })?;
    tracing::info!(path = %runner.display(), "Found runner");

    tracing::info!(file = %layout.config_file, "Locating configuration file");
    let strategy = config_strategy(layout);
    let config = strategy.search(root).ok_or_else(|| {
        let searched = strategy.searched_locations(root);
        tracing::error!(
            searched = %display_paths(&searched),
            "Configuration file not found in extracted payload"
        );
        LaunchError::ConfigNotFound {
            name: layout.config_file.clone(),
            root: root.to_path_buf(),
            searched,
        }
    })?;
    tracing::info!(path = %config.display(), "Found configuration");

    let cache_dir = cache_strategy(layout).search(root);
    match &cache_dir {
        Some(dir) => tracing::info!(path = %dir.display(), "Found cache directory"),
        None => tracing::warn!(
            name = %layout.cache_dir,
            "No cache directory found, runner will use its default"
        ),
    }

    Ok(PayloadMembers {
        runner,
        config,
        cache_dir,
    })
}
