//! `copykit_fs` v1:
//! Recursive `cp -a`-style copy of a file, directory tree or symlink.
//!
//! Modules:
//! - `copy` : entry points, per-kind dispatch and the three copiers
//! - `spec` : symlink strategy, options, entry descriptor, errors
//! - `util` : skip set, first-error slot, mode/link/time helpers
//!
//! ```no_run
//! use copykit_fs::{EnumCopySymlinkStrategy, SpecCopyOptions, copy_with_skip};
//!
//! let spec_cp_options = SpecCopyOptions::default().with_on_symlink(|path| {
//!     if path.ends_with("vendor") {
//!         EnumCopySymlinkStrategy::Deep
//!     } else {
//!         EnumCopySymlinkStrategy::Shallow
//!     }
//! });
//! copy_with_skip("site", "site.bak", &["site/.cache"], &spec_cp_options)?;
//! # Ok::<(), copykit_fs::CopyError>(())
//! ```

pub mod copy;
pub mod spec;
mod util;

pub use copy::{copy, copy_with_skip};
pub use spec::{
    CopyError, EnumCopySymlinkStrategy, FnOnSymlink, SPEC_COPY_OPTIONS_DEFAULT, SpecCopyOptions,
    derive_default_symlink_strategy,
};
