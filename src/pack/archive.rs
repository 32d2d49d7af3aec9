use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::config::{BuildInfo, Layout, Manifest, MANIFEST_FILE_NAME};
use crate::util::paths::archive_entry_name;

use super::filter::{ExcludeRules, IncludeAll, PathFilter};
use super::PackError;

/// Totals reported after an archive is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of file entries, manifest included
    pub entries: usize,
    /// Size of the finished archive in bytes
    pub bytes: u64,
}

/// Check the packager inputs before anything is written.
///
/// A project without the entry configuration file is only a warning: the
/// launcher may still find one elsewhere in the tree.
pub fn validate_inputs(runner: &Path, project: &Path, layout: &Layout) -> Result<(), PackError> {
    if !runner.exists() {
        return Err(PackError::RunnerNotFound(runner.to_path_buf()));
    }
    if !runner.is_file() {
        return Err(PackError::RunnerNotAFile(runner.to_path_buf()));
    }

    if !project.exists() {
        return Err(PackError::ProjectNotFound(project.to_path_buf()));
    }
    if !project.is_dir() {
        return Err(PackError::ProjectNotADirectory(project.to_path_buf()));
    }

    let config = project.join(&layout.config_file);
    if !config.exists() {
        tracing::warn!(
            project = %project.display(),
            file = %layout.config_file,
            "Configuration file not found in project, the artifact may fail to run"
        );
    }

    Ok(())
}

/// Writes the payload archive
pub struct ArchiveBuilder<F = ExcludeRules> {
    layout: Layout,
    filter: F,
}

impl ArchiveBuilder<ExcludeRules> {
    /// Builder whose project filter follows the layout's exclusion rules
    pub fn new(layout: Layout) -> Self {
        let filter = ExcludeRules::from_layout(&layout);
        Self { layout, filter }
    }
}

impl<F: PathFilter> ArchiveBuilder<F> {
    /// Replace the project path filter
    pub fn with_filter<G: PathFilter>(self, filter: G) -> ArchiveBuilder<G> {
        ArchiveBuilder {
            layout: self.layout,
            filter,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Write `<runner>`, `<cache_dir>/**`, `<project_dir>/**` and the
    /// manifest into a new zip at `output`
    pub fn build(
        &self,
        runner: &Path,
        cache: Option<&Path>,
        project: &Path,
        output: &Path,
    ) -> Result<ArchiveSummary, PackError> {
        validate_inputs(runner, project, &self.layout)?;

        tracing::info!(output = %output.display(), "Creating payload archive");
        let mut zip = ZipWriter::new(BufWriter::new(File::create(output)?));
        let mut entries = 0usize;

        let runner_name = runner
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PackError::RunnerNotAFile(runner.to_path_buf()))?;
        tracing::info!(runner = %runner.display(), "Adding runner");
        add_file(&mut zip, runner, &runner_name)?;
        entries += 1;

        match cache {
            Some(cache) if cache.is_dir() => {
                tracing::info!(cache = %cache.display(), "Adding cache directory");
                entries += add_tree(&mut zip, cache, &self.layout.cache_dir, &IncludeAll)?;
            }
            Some(cache) => {
                tracing::warn!(cache = %cache.display(), "Cache directory not found, skipping");
            }
            None => {}
        }

        tracing::info!(project = %project.display(), "Adding project");
        entries += add_tree(&mut zip, project, &self.layout.project_dir, &self.filter)?;

        let manifest = Manifest::new(
            self.layout.clone(),
            BuildInfo {
                created_at: Utc::now(),
                satchel_version: env!("CARGO_PKG_VERSION").to_string(),
                runner_source: display_abs(runner),
                project_source: display_abs(project),
                cache_source: cache.map(display_abs),
            },
        );
        zip.start_file(MANIFEST_FILE_NAME, deflated())?;
        zip.write_all(manifest.to_toml()?.as_bytes())?;
        entries += 1;

        let mut writer = zip.finish()?;
        writer.flush()?;
        drop(writer);

        let bytes = output.metadata()?.len();
        tracing::info!(
            entries,
            bytes,
            mb = %format!("{:.2}", bytes as f64 / 1024.0 / 1024.0),
            "Payload archive created"
        );

        Ok(ArchiveSummary { entries, bytes })
    }
}

fn display_abs(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn deflated() -> FileOptions {
    FileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn options_for(path: &Path) -> io::Result<FileOptions> {
    let metadata = path.metadata()?;
    let mut options = deflated().large_file(metadata.len() >= u32::MAX as u64);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o777);
    }

    Ok(options)
}

fn add_file<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
) -> Result<(), PackError> {
    zip.start_file(name, options_for(path)?)?;
    let mut reader = BufReader::new(File::open(path)?);
    io::copy(&mut reader, zip)?;
    Ok(())
}

/// Add every regular file under `root` accepted by `filter` as
/// `<prefix>/<relative path>`; returns the number of files added
fn add_tree<W: Write + io::Seek, F: PathFilter + ?Sized>(
    zip: &mut ZipWriter<W>,
    root: &Path,
    prefix: &str,
    filter: &F,
) -> Result<usize, PackError> {
    let mut added = 0usize;
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .path()
                    .strip_prefix(root)
                    .map(|rel| filter.include(rel))
                    .unwrap_or(false)
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel: PathBuf = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        add_file(zip, entry.path(), &archive_entry_name(Some(prefix), &rel))?;
        added += 1;
        if added % 100 == 0 {
            tracing::info!(added, prefix, "Adding files");
        }
    }

    Ok(added)
}
