// Local file handling: the allow-list applied before any upload and the
// directory scanner the CLI uses to build the batch.

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Extensions the knowledge store can index (compared lowercased).
pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "txt", "pdf", "doc", "docx"];

/// OS metadata files that are never uploaded, whatever their extension.
pub const IGNORED_FILE_NAMES: &[&str] = &[".ds_store", "thumbs.db"];

/// Returns whether a file should be uploaded based on its name alone.
pub fn is_allowed_file(path: &Path) -> bool {
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_lowercase(),
        None => return false,
    };
    if IGNORED_FILE_NAMES.contains(&file_name.as_str()) {
        return false;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Collect every regular file under `directory`, sorted by path.
///
/// Hidden files are included and ignore files are not consulted: filtering
/// is the uploader's job, so skipped files still show up in the summary.
pub fn collect_files(directory: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    let mut walker = WalkBuilder::new(directory);
    walker.standard_filters(false).follow_links(false);
    if !recursive {
        walker.max_depth(Some(1));
    }

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = entry.with_context(|| format!("Failed to scan {}", directory.display()))?;
        if entry.file_type().map_or(false, |t| t.is_file()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
