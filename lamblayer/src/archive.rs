//! Zip archive creation for directory-sourced layers.
//!
//! A layer's contents are mounted under `/opt` in the function's filesystem,
//! so the source tree is usually wrapped in one or two directories (for
//! example `python/lib`) before it is zipped. The archiver copies the source
//! into `rawlayer/<wrap1>/<wrap2>/` beneath a scratch directory, zips
//! `rawlayer`, and reads the archive back into memory. The scratch directory
//! is removed on every return path.

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Name of the directory inside the scratch area that is zipped.
const LAYER_ROOT_DIR: &str = "rawlayer";
/// File name of the zip written inside the scratch area.
const ARCHIVE_FILE: &str = "ziplayer.zip";
/// Number of hex characters of the time hash used in scratch names.
const SCRATCH_HASH_LEN: usize = 16;

/// Errors arising from archive creation.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The source directory does not exist.
    #[error("source path {path} does not exist")]
    SourceNotFound {
        /// The missing source path.
        path: PathBuf,
    },

    /// The source path exists but is not a directory.
    #[error("source path {path} is not a directory")]
    SourceNotDirectory {
        /// The offending source path.
        path: PathBuf,
    },

    /// A wrap directory name would escape or restructure the layer root.
    #[error("invalid wrap directory name \"{name}\": must be a single path component")]
    InvalidWrapDir {
        /// The rejected name.
        name: String,
    },

    /// I/O error while copying, zipping, or reading back the archive.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    /// Walking the source tree failed.
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The zip writer rejected an entry.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Up to two directory names that prefix every path inside the archive.
///
/// Empty names are skipped, so `WrapDirs::new(None, Some("python"))` and
/// `WrapDirs::new(Some(""), Some("python"))` both produce `python/...`.
///
/// # Examples
///
/// ```
/// use lamblayer::archive::WrapDirs;
///
/// let wraps = WrapDirs::new(Some("python"), Some("lib"));
/// assert_eq!(wraps.entry_prefix(), "python/lib/");
/// assert_eq!(WrapDirs::default().entry_prefix(), "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapDirs {
    segments: Vec<String>,
}

impl WrapDirs {
    /// Build wrap directories from the two optional CLI names.
    #[must_use]
    pub fn new(first: Option<&str>, second: Option<&str>) -> Self {
        let segments = [first, second]
            .into_iter()
            .flatten()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        Self { segments }
    }

    /// The wrap names in archive order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The prefix every archive entry starts with, including a trailing `/`
    /// when non-empty.
    #[must_use]
    pub fn entry_prefix(&self) -> String {
        self.segments
            .iter()
            .map(|segment| format!("{segment}/"))
            .collect()
    }

    /// Check each wrap name is a single plain path component.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidWrapDir`] for a name such as `..`,
    /// `a/b` or an absolute path.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        for name in &self.segments {
            let mut components = Path::new(name).components();
            let single_normal = matches!(components.next(), Some(Component::Normal(_)))
                && components.next().is_none();
            if !single_normal || name.contains(['/', '\\']) {
                return Err(ArchiveError::InvalidWrapDir { name: name.clone() });
            }
        }
        Ok(())
    }

    fn join_onto(&self, base: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(base.to_path_buf(), |path, segment| path.join(segment))
    }
}

/// Builds in-memory zip archives from source directories.
#[derive(Debug, Clone)]
pub struct Archiver {
    scratch_root: PathBuf,
}

impl Archiver {
    /// Create an archiver that places scratch directories under `scratch_root`.
    #[must_use]
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    /// Create an archiver that uses the system temporary directory.
    #[must_use]
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Zip the contents of `src` under the given wrap directories.
    ///
    /// Returns the raw bytes of the archive. The scratch directory used to
    /// stage the copy is removed whether or not archiving succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::SourceNotFound`] or
    /// [`ArchiveError::SourceNotDirectory`] for an unusable source,
    /// [`ArchiveError::InvalidWrapDir`] for a wrap name that is not a single
    /// path component, and I/O, walk, or zip errors raised while building.
    pub fn create_zip(&self, src: &Path, wraps: &WrapDirs) -> Result<Vec<u8>, ArchiveError> {
        validate_source(src)?;
        wraps.validate()?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("lamblayer-{}-", scratch_hash()))
            .tempdir_in(&self.scratch_root)?;
        debug!("staging layer in {}", scratch.path().display());

        let zipped = stage_and_zip(scratch.path(), src, wraps);

        if let Err(err) = scratch.close() {
            warn!("failed to remove scratch directory: {err}");
        }

        let bytes = zipped?;
        info!("zip archive wrote {} bytes", bytes.len());
        Ok(bytes)
    }
}

fn stage_and_zip(scratch: &Path, src: &Path, wraps: &WrapDirs) -> Result<Vec<u8>, ArchiveError> {
    let layer_root = scratch.join(LAYER_ROOT_DIR);
    let copy_root = wraps.join_onto(&layer_root);
    copy_tree(src, &copy_root)?;

    let archive_path = scratch.join(ARCHIVE_FILE);
    write_zip(&layer_root, &archive_path)?;
    Ok(fs::read(&archive_path)?)
}

fn validate_source(src: &Path) -> Result<(), ArchiveError> {
    match fs::metadata(src) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ArchiveError::SourceNotDirectory {
            path: src.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ArchiveError::SourceNotFound {
            path: src.to_path_buf(),
        }),
        Err(err) => Err(ArchiveError::Io(err)),
    }
}

/// Hash of the current time and process id, used to name scratch directories.
fn scratch_hash() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex.chars().take(SCRATCH_HASH_LEN).collect()
}

/// Recursively copy `src` into `dest`, following symlinks.
fn copy_tree(src: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).follow_links(true).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Zip everything under `root` into `archive_path`, with entry names
/// relative to `root`.
fn write_zip(root: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
        let name = entry_name(relative);
        let options = entry_options(&entry.metadata()?);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    let mut file = zip.finish()?;
    file.flush()?;
    Ok(())
}

/// Join path components with `/` regardless of the host separator.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn entry_options(metadata: &fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;

    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn entry_options(_metadata: &fs::Metadata) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
