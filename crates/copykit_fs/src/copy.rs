//! Recursive traversal and per-entry copy dispatch.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, trace};

use crate::spec::{CopyError, EnumCopySymlinkStrategy, SpecCopyOptions, SpecEntry};
use crate::util::{
    SetSkipPaths, SlotFirstError, apply_times, build_skip_set, create_dir_writable,
    create_parent_dirs, create_symbolic_link, is_skipped, prepare_file_destination, read_link,
    release_file, resolve_link_target, set_permissions,
};

/// Copy `source` to `destination`, whatever kind of entry `source` is.
///
/// Same as [`copy_with_skip`] with an empty skip list.
pub fn copy<P, Q>(
    source: P,
    destination: Q,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    copy_with_skip::<P, Q, &str>(source, destination, &[], spec_cp_options)
}

/// Copy `source` to `destination`, leaving out every path listed in `paths_skip`.
///
/// Skip entries are written with `/` separators and compared, after conversion
/// to native separators, as exact strings against each visited source path. A
/// path under `source` is therefore spelled the way `source` itself is spelled
/// by the caller (`src/a/b`, not `a/b`).
///
/// Directories are created writable first and get their source mode back
/// once their subtree is done, whether that subtree succeeded or not. The
/// first error anywhere stops the run; whatever was already written stays.
///
/// # Errors
///
/// Returns the first [`CopyError`] met during the traversal.
pub fn copy_with_skip<P, Q, S>(
    source: P,
    destination: Q,
    paths_skip: &[S],
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    S: AsRef<str>,
{
    let path_src = source.as_ref();
    let path_dst = destination.as_ref();
    let set_skip_paths = build_skip_set(paths_skip);

    let meta_src = fs::symlink_metadata(path_src).map_err(|e| CopyError::Stat {
        path: path_src.to_path_buf(),
        source: e,
    })?;
    let spec_entry = SpecEntry::from_metadata(path_src, meta_src);

    debug!(
        src = %path_src.display(),
        dst = %path_dst.display(),
        n_skip = set_skip_paths.len(),
        "copy start"
    );
    copy_entry(
        path_src,
        path_dst,
        &set_skip_paths,
        &spec_entry,
        spec_cp_options,
    )
}

// `spec_entry` MUST describe `path_src` as seen by a non-following stat.
fn copy_entry(
    path_src: &Path,
    path_dst: &Path,
    set_skip_paths: &SetSkipPaths,
    spec_entry: &SpecEntry,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    if is_skipped(path_src, set_skip_paths) {
        debug!(src = %path_src.display(), "skip set hit");
        return Ok(());
    }

    let cfg_file_type = spec_entry.file_type();
    if cfg_file_type.is_symlink() {
        return copy_symlink(path_src, path_dst, spec_cp_options);
    }
    if cfg_file_type.is_dir() {
        return copy_dir(
            path_src,
            path_dst,
            set_skip_paths,
            spec_entry,
            spec_cp_options,
        );
    }
    copy_file(path_src, path_dst, spec_entry, spec_cp_options)
}

////////////////////////////////////////////////////////////////////////////////
// #region Files

fn copy_file(
    path_file_src: &Path,
    path_file_dst: &Path,
    spec_entry: &SpecEntry,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    create_parent_dirs(path_file_dst)?;
    prepare_file_destination(path_file_dst)?;

    let mut file_dst = File::create(path_file_dst).map_err(|e| CopyError::CreateFile {
        path: path_file_dst.to_path_buf(),
        source: e,
    })?;

    let mut slot_err = SlotFirstError::default();
    slot_err.record(write_file(
        &mut file_dst,
        path_file_src,
        path_file_dst,
        spec_entry,
        spec_cp_options,
    ));
    slot_err.record(release_file(
        file_dst,
        path_file_dst,
        spec_cp_options.if_sync,
    ));
    slot_err.into_result()?;

    trace!(src = %path_file_src.display(), dst = %path_file_dst.display(), "file copied");
    Ok(())
}

fn write_file(
    file_dst: &mut File,
    path_file_src: &Path,
    path_file_dst: &Path,
    spec_entry: &SpecEntry,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    file_dst
        .set_permissions(spec_entry.permissions())
        .map_err(|e| CopyError::SetPermissions {
            path: path_file_dst.to_path_buf(),
            source: e,
        })?;

    let mut file_src = File::open(path_file_src).map_err(|e| CopyError::OpenSource {
        path: path_file_src.to_path_buf(),
        source: e,
    })?;
    io::copy(&mut file_src, file_dst).map_err(|e| CopyError::CopyContent {
        path: path_file_dst.to_path_buf(),
        source: e,
    })?;
    // Read-only handle: nothing to flush, so dropping it cannot lose data.
    drop(file_src);

    if spec_cp_options.if_preserve_times {
        apply_times(file_dst, path_file_dst, &spec_entry.meta)?;
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Directories

fn copy_dir(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    set_skip_paths: &SetSkipPaths,
    spec_entry: &SpecEntry,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    let permissions_original = spec_entry.permissions();

    create_dir_writable(path_dir_dst)?;
    debug!(src = %path_dir_src.display(), dst = %path_dir_dst.display(), "enter directory");

    // Mode restore runs whether or not the subtree made it.
    let mut slot_err = SlotFirstError::default();
    slot_err.record(copy_dir_children(
        path_dir_src,
        path_dir_dst,
        set_skip_paths,
        spec_cp_options,
    ));
    slot_err.record(set_permissions(path_dir_dst, permissions_original));
    slot_err.into_result()
}

fn copy_dir_children(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    set_skip_paths: &SetSkipPaths,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    for spec_child in list_dir_entries(path_dir_src)? {
        let path_child_src = path_dir_src.join(&spec_child.name);
        let path_child_dst = path_dir_dst.join(&spec_child.name);
        copy_entry(
            &path_child_src,
            &path_child_dst,
            set_skip_paths,
            &spec_child,
            spec_cp_options,
        )?;
    }
    Ok(())
}

/// One level of `path_dir`, sorted by file name.
fn list_dir_entries(path_dir: &Path) -> Result<Vec<SpecEntry>, CopyError> {
    let map_err = |e: io::Error| CopyError::ReadDir {
        path: path_dir.to_path_buf(),
        source: e,
    };

    let mut l_entries = Vec::new();
    for entry_res in fs::read_dir(path_dir).map_err(map_err)? {
        let entry = entry_res.map_err(map_err)?;
        let spec_entry = SpecEntry::from_dir_entry(&entry).map_err(|e| CopyError::Stat {
            path: entry.path(),
            source: e,
        })?;
        l_entries.push(spec_entry);
    }
    l_entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(l_entries)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Symlinks

fn copy_symlink(
    path_src: &Path,
    path_dst: &Path,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), CopyError> {
    let enum_rule_symlink = spec_cp_options.resolve_symlink_strategy(path_src);
    debug!(src = %path_src.display(), rule = ?enum_rule_symlink, "symlink");

    match enum_rule_symlink {
        EnumCopySymlinkStrategy::Shallow => create_symbolic_link(path_src, path_dst),
        EnumCopySymlinkStrategy::Deep => {
            let path_target = read_link(path_src)?;
            let path_target = resolve_link_target(path_src, &path_target);
            let meta_target = fs::symlink_metadata(&path_target).map_err(|e| CopyError::Stat {
                path: path_target.clone(),
                source: e,
            })?;
            let spec_target = SpecEntry::from_metadata(&path_target, meta_target);

            // Skip set is not carried into a dereferenced target; no cycle guard either.
            copy_entry(
                &path_target,
                path_dst,
                &SetSkipPaths::new(),
                &spec_target,
                spec_cp_options,
            )
        }
        EnumCopySymlinkStrategy::Skip => Ok(()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
