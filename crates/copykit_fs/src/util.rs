use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, Metadata, Permissions};
use std::io;
use std::path::{Path, PathBuf};

use crate::spec::CopyError;

/// Mode given to a destination directory while its subtree is being written.
#[cfg(unix)]
pub(crate) const N_MODE_DIR_TMP: u32 = 0o755;

////////////////////////////////////////////////////////////////////////////////
// #region SkipSet

/// Paths excluded from one copy run, compared as exact strings.
pub(crate) type SetSkipPaths = HashSet<OsString>;

/// Build the skip set from `/`-separated caller paths.
pub(crate) fn build_skip_set<S: AsRef<str>>(paths_skip: &[S]) -> SetSkipPaths {
    paths_skip
        .iter()
        .map(|p| from_slash(p.as_ref()))
        .collect()
}

/// Convert `/` separators to the platform separator.
pub(crate) fn from_slash(path: &str) -> OsString {
    if std::path::MAIN_SEPARATOR == '/' {
        return OsString::from(path);
    }
    OsString::from(path.replace('/', std::path::MAIN_SEPARATOR_STR))
}

pub(crate) fn is_skipped(path: &Path, set_skip_paths: &SetSkipPaths) -> bool {
    set_skip_paths.contains(path.as_os_str())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ErrorSlot

/// Error slot for one operation and its deferred cleanups.
///
/// The first recorded error is kept; later ones are discarded.
#[derive(Debug, Default)]
pub(crate) struct SlotFirstError {
    err_first: Option<CopyError>,
}

impl SlotFirstError {
    pub(crate) fn record(&mut self, res: Result<(), CopyError>) {
        if let Err(e) = res
            && self.err_first.is_none()
        {
            self.err_first = Some(e);
        }
    }

    pub(crate) fn into_result(self) -> Result<(), CopyError> {
        match self.err_first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Directories

/// Create `path_dir` and missing parents with the temporary writable mode.
///
/// A directory left read-only by an earlier run is opened up again too.
pub(crate) fn create_dir_writable(path_dir: &Path) -> Result<(), CopyError> {
    let mut builder_dir = fs::DirBuilder::new();
    builder_dir.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder_dir.mode(N_MODE_DIR_TMP);
    }
    builder_dir
        .create(path_dir)
        .map_err(|e| CopyError::CreateDir {
            path: path_dir.to_path_buf(),
            source: e,
        })?;
    set_permissions(path_dir, derive_writable_dir_permissions(path_dir)?)
}

#[cfg(unix)]
fn derive_writable_dir_permissions(_path_dir: &Path) -> Result<Permissions, CopyError> {
    use std::os::unix::fs::PermissionsExt;
    Ok(Permissions::from_mode(N_MODE_DIR_TMP))
}

#[cfg(not(unix))]
fn derive_writable_dir_permissions(path_dir: &Path) -> Result<Permissions, CopyError> {
    let mut permissions = fs::metadata(path_dir)
        .map_err(|e| CopyError::Stat {
            path: path_dir.to_path_buf(),
            source: e,
        })?
        .permissions();
    permissions.set_readonly(false);
    Ok(permissions)
}

/// Create the missing parents of `path_file` with the default mode.
pub(crate) fn create_parent_dirs(path_file: &Path) -> Result<(), CopyError> {
    let Some(path_parent) = path_file.parent() else {
        return Ok(());
    };
    if path_parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(path_parent).map_err(|e| CopyError::CreateDir {
        path: path_parent.to_path_buf(),
        source: e,
    })
}

pub(crate) fn set_permissions(path: &Path, permissions: Permissions) -> Result<(), CopyError> {
    fs::set_permissions(path, permissions).map_err(|e| CopyError::SetPermissions {
        path: path.to_path_buf(),
        source: e,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Files

/// Get an existing destination out of the way of `File::create`.
///
/// A link is removed so the copy never writes through it; a regular file
/// without owner write permission gets it back before being truncated.
pub(crate) fn prepare_file_destination(path_file_dst: &Path) -> Result<(), CopyError> {
    let meta_dst = match fs::symlink_metadata(path_file_dst) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(CopyError::Stat {
                path: path_file_dst.to_path_buf(),
                source: e,
            });
        }
    };

    if meta_dst.file_type().is_symlink() {
        return fs::remove_file(path_file_dst).map_err(|e| CopyError::CreateFile {
            path: path_file_dst.to_path_buf(),
            source: e,
        });
    }
    if !meta_dst.file_type().is_file() {
        return Ok(());
    }

    let mut permissions = meta_dst.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if permissions.mode() & 0o200 != 0 {
            return Ok(());
        }
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !permissions.readonly() {
            return Ok(());
        }
        permissions.set_readonly(false);
    }
    set_permissions(path_file_dst, permissions)
}

/// Carry access/modification times of `meta_src` onto the open destination.
pub(crate) fn apply_times(
    file_dst: &File,
    path_file_dst: &Path,
    meta_src: &Metadata,
) -> Result<(), CopyError> {
    use filetime::{FileTime, set_file_handle_times};

    let file_time_access = FileTime::from_last_access_time(meta_src);
    let file_time_modify = FileTime::from_last_modification_time(meta_src);
    set_file_handle_times(file_dst, Some(file_time_access), Some(file_time_modify)).map_err(|e| {
        CopyError::SetTimes {
            path: path_file_dst.to_path_buf(),
            source: e,
        }
    })
}

/// Release the destination handle, syncing it first when asked to.
///
/// std closes on drop and discards the `close(2)` result, so `sync_all` is the
/// only observable failure point of a release. The source handle is opened
/// read-only and has nothing to flush; it is dropped at the end of
/// `write_file` on every path and has no fallible release of its own.
pub(crate) fn release_file(
    file_dst: File,
    path_file_dst: &Path,
    if_sync: bool,
) -> Result<(), CopyError> {
    let res_sync = if if_sync {
        file_dst.sync_all()
    } else {
        Ok(())
    };
    drop(file_dst);
    res_sync.map_err(|e| CopyError::Release {
        path: path_file_dst.to_path_buf(),
        source: e,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Symlinks

pub(crate) fn read_link(path_link: &Path) -> Result<PathBuf, CopyError> {
    fs::read_link(path_link).map_err(|e| CopyError::ReadLink {
        path: path_link.to_path_buf(),
        source: e,
    })
}

/// Where a Deep dereference of `path_link` (pointing at `path_target`) lands.
///
/// Relative targets are taken relative to the link's own directory, the way the
/// kernel follows them, and not against the process working directory.
pub(crate) fn resolve_link_target(path_link: &Path, path_target: &Path) -> PathBuf {
    if path_target.is_absolute() {
        return path_target.to_path_buf();
    }
    match path_link.parent() {
        Some(path_parent) => path_parent.join(path_target),
        None => path_target.to_path_buf(),
    }
}

/// Replicate the link at `path_src` as `path_dst`, keeping its target verbatim.
///
/// An existing non-directory at `path_dst` is replaced; a directory there is
/// left alone and the link creation fails.
pub(crate) fn create_symbolic_link(path_src: &Path, path_dst: &Path) -> Result<(), CopyError> {
    let target = read_link(path_src)?;
    remove_non_dir(path_dst)?;
    symlink_native(path_src, &target, path_dst)
}

fn remove_non_dir(path_dst: &Path) -> Result<(), CopyError> {
    match fs::symlink_metadata(path_dst) {
        Ok(meta_dst) if !meta_dst.file_type().is_dir() => {
            fs::remove_file(path_dst).map_err(|e| CopyError::CreateSymlink {
                path: path_dst.to_path_buf(),
                source: e,
            })
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CopyError::Stat {
            path: path_dst.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(unix)]
fn symlink_native(_path_src: &Path, target: &Path, path_dst: &Path) -> Result<(), CopyError> {
    std::os::unix::fs::symlink(target, path_dst).map_err(|e| CopyError::CreateSymlink {
        path: path_dst.to_path_buf(),
        source: e,
    })
}

#[cfg(windows)]
fn symlink_native(path_src: &Path, target: &Path, path_dst: &Path) -> Result<(), CopyError> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let res = if path_src.is_dir() {
        symlink_dir(target, path_dst)
    } else {
        symlink_file(target, path_dst)
    };
    res.map_err(|e| CopyError::CreateSymlink {
        path: path_dst.to_path_buf(),
        source: e,
    })
}

#[cfg(not(any(unix, windows)))]
fn symlink_native(_path_src: &Path, _target: &Path, path_dst: &Path) -> Result<(), CopyError> {
    Err(CopyError::Unsupported {
        path: path_dst.to_path_buf(),
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::{Path, PathBuf};

    use super::{SlotFirstError, build_skip_set, is_skipped, resolve_link_target};
    use crate::spec::CopyError;

    fn err_at(path: &str) -> CopyError {
        CopyError::SetPermissions {
            path: PathBuf::from(path),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }
    }

    #[test]
    fn slot_keeps_first_error() {
        let mut slot = SlotFirstError::default();
        slot.record(Ok(()));
        slot.record(Err(err_at("body")));
        slot.record(Err(err_at("cleanup")));
        let err = slot.into_result().expect_err("slot holds an error");
        assert_eq!(err.path(), Path::new("body"));
    }

    #[test]
    fn slot_reports_cleanup_when_body_succeeded() {
        let mut slot = SlotFirstError::default();
        slot.record(Ok(()));
        slot.record(Err(err_at("cleanup")));
        let err = slot.into_result().expect_err("cleanup error surfaces");
        assert_eq!(err.path(), Path::new("cleanup"));
    }

    #[test]
    fn empty_slot_is_ok() {
        assert!(SlotFirstError::default().into_result().is_ok());
    }

    #[test]
    fn skip_set_matches_exact_strings_only() {
        let set_skip_paths = build_skip_set(&["src/a/b", "src/c"]);
        let path_skipped: PathBuf = ["src", "a", "b"].iter().collect();
        assert!(is_skipped(&path_skipped, &set_skip_paths));
        assert!(is_skipped(Path::new("src/c"), &set_skip_paths));
        assert!(!is_skipped(Path::new("src/a"), &set_skip_paths));
        assert!(!is_skipped(Path::new("src/c/d"), &set_skip_paths));
        assert!(!is_skipped(Path::new("./src/c"), &set_skip_paths));
    }

    #[test]
    fn relative_link_target_resolves_next_to_link_not_cwd() {
        assert_eq!(
            resolve_link_target(Path::new("tree/sub/link"), Path::new("../file.txt")),
            Path::new("tree/sub/../file.txt")
        );
        assert_eq!(
            resolve_link_target(Path::new("tree/link"), Path::new("/etc/hostname")),
            Path::new("/etc/hostname")
        );
        assert_eq!(
            resolve_link_target(Path::new("link"), Path::new("file.txt")),
            Path::new("file.txt")
        );
    }
}
