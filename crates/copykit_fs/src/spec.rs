//! Copy specification models and top-level error types.

use std::ffi::OsString;
use std::fmt;
use std::fs::{DirEntry, FileType, Metadata, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Symlink handling policy, decided per link by [`SpecCopyOptions::on_symlink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCopySymlinkStrategy {
    /// Create a symbolic link at destination with the same target string.
    #[default]
    Shallow,
    /// Follow the link and copy whatever it points at.
    Deep,
    /// Ignore the link entirely.
    Skip,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Symlink policy hook: source path of the link in, strategy out.
pub type FnOnSymlink = Arc<dyn Fn(&Path) -> EnumCopySymlinkStrategy + Send + Sync>;

/// Input options for [`crate::copy`] and [`crate::copy_with_skip`].
#[derive(Clone)]
pub struct SpecCopyOptions {
    /// Symlink policy hook. `None` falls back to [`derive_default_symlink_strategy`].
    pub on_symlink: Option<FnOnSymlink>,
    /// Carry source access/modification times over to copied files.
    pub if_preserve_times: bool,
    /// `sync_all` each destination file before releasing its handle.
    pub if_sync: bool,
}

/// Options used when the caller has no opinion.
pub const SPEC_COPY_OPTIONS_DEFAULT: SpecCopyOptions = SpecCopyOptions {
    on_symlink: None,
    if_preserve_times: false,
    if_sync: false,
};

/// Default symlink policy: always [`EnumCopySymlinkStrategy::Shallow`].
pub fn derive_default_symlink_strategy(_path: &Path) -> EnumCopySymlinkStrategy {
    EnumCopySymlinkStrategy::Shallow
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        SPEC_COPY_OPTIONS_DEFAULT
    }
}

impl fmt::Debug for SpecCopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecCopyOptions")
            .field(
                "on_symlink",
                &self.on_symlink.as_ref().map(|_| "<fn>").unwrap_or("<default>"),
            )
            .field("if_preserve_times", &self.if_preserve_times)
            .field("if_sync", &self.if_sync)
            .finish()
    }
}

impl SpecCopyOptions {
    /// Return a copy of `self` using `on_symlink` as the policy hook.
    pub fn with_on_symlink<F>(&self, on_symlink: F) -> SpecCopyOptions
    where
        F: Fn(&Path) -> EnumCopySymlinkStrategy + Send + Sync + 'static,
    {
        SpecCopyOptions {
            on_symlink: Some(Arc::new(on_symlink)),
            ..self.clone()
        }
    }

    /// Return a copy of `self` applying one fixed strategy to every link.
    pub fn with_symlink_strategy(&self, rule_symlink: EnumCopySymlinkStrategy) -> SpecCopyOptions {
        self.with_on_symlink(move |_| rule_symlink)
    }

    /// Evaluate the configured hook, or the default one, for `path_link`.
    pub fn resolve_symlink_strategy(&self, path_link: &Path) -> EnumCopySymlinkStrategy {
        match &self.on_symlink {
            Some(on_symlink) => on_symlink(path_link),
            None => derive_default_symlink_strategy(path_link),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EntryDescriptor

/// Name plus non-following stat of one entry.
///
/// Taken once per entry and handed down, so the dispatcher never re-stats.
#[derive(Debug, Clone)]
pub(crate) struct SpecEntry {
    pub(crate) name: OsString,
    pub(crate) meta: Metadata,
}

impl SpecEntry {
    pub(crate) fn from_metadata(path: &Path, meta: Metadata) -> Self {
        Self {
            name: path.file_name().map(OsString::from).unwrap_or_default(),
            meta,
        }
    }

    pub(crate) fn from_dir_entry(entry: &DirEntry) -> io::Result<Self> {
        Ok(Self {
            name: entry.file_name(),
            meta: entry.metadata()?,
        })
    }

    pub(crate) fn file_type(&self) -> FileType {
        self.meta.file_type()
    }

    pub(crate) fn permissions(&self) -> Permissions {
        self.meta.permissions()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// First failure of a copy run. Every variant carries the path involved.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Non-following stat of a source entry or a dereferenced link target failed.
    #[error("Failed to stat {}: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    /// Destination directory (or a missing parent) could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// Source directory listing failed.
    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    /// Destination file could not be created or truncated.
    #[error("Failed to create file {}: {source}", .path.display())]
    CreateFile { path: PathBuf, source: io::Error },

    /// Source file could not be opened for reading.
    #[error("Failed to open source file {}: {source}", .path.display())]
    OpenSource { path: PathBuf, source: io::Error },

    /// Streaming bytes into the destination failed.
    #[error("Failed to copy content into {}: {source}", .path.display())]
    CopyContent { path: PathBuf, source: io::Error },

    /// Setting or restoring permission bits failed.
    #[error("Failed to set permissions on {}: {source}", .path.display())]
    SetPermissions { path: PathBuf, source: io::Error },

    /// Carrying timestamps over to the destination failed.
    #[error("Failed to set times on {}: {source}", .path.display())]
    SetTimes { path: PathBuf, source: io::Error },

    /// Releasing the destination handle failed.
    #[error("Failed to release {}: {source}", .path.display())]
    Release { path: PathBuf, source: io::Error },

    /// Reading a symlink's target failed.
    #[error("Failed to read link {}: {source}", .path.display())]
    ReadLink { path: PathBuf, source: io::Error },

    /// Creating the replicated symlink failed.
    #[error("Failed to create symlink {}: {source}", .path.display())]
    CreateSymlink { path: PathBuf, source: io::Error },

    /// Symbolic links are not available on this platform.
    #[error("Symbolic links are unsupported on this platform: {}", .path.display())]
    Unsupported { path: PathBuf },
}

impl CopyError {
    /// Path the failing operation was working on.
    pub fn path(&self) -> &Path {
        match self {
            Self::Stat { path, .. }
            | Self::CreateDir { path, .. }
            | Self::ReadDir { path, .. }
            | Self::CreateFile { path, .. }
            | Self::OpenSource { path, .. }
            | Self::CopyContent { path, .. }
            | Self::SetPermissions { path, .. }
            | Self::SetTimes { path, .. }
            | Self::Release { path, .. }
            | Self::ReadLink { path, .. }
            | Self::CreateSymlink { path, .. }
            | Self::Unsupported { path } => path,
        }
    }

    /// Kind of the underlying I/O error.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Stat { source, .. }
            | Self::CreateDir { source, .. }
            | Self::ReadDir { source, .. }
            | Self::CreateFile { source, .. }
            | Self::OpenSource { source, .. }
            | Self::CopyContent { source, .. }
            | Self::SetPermissions { source, .. }
            | Self::SetTimes { source, .. }
            | Self::Release { source, .. }
            | Self::ReadLink { source, .. }
            | Self::CreateSymlink { source, .. } => source.kind(),
            Self::Unsupported { .. } => io::ErrorKind::Unsupported,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
