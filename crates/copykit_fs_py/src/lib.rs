use std::io;
use std::path::Path;

use copykit_fs::{CopyError, EnumCopySymlinkStrategy, SpecCopyOptions, copy_with_skip};
use pyo3::exceptions::{
    PyFileExistsError, PyFileNotFoundError, PyIsADirectoryError, PyNotADirectoryError, PyOSError,
    PyPermissionError, PyTypeError, PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::PyString;
use tracing::warn;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "copykit.fs.copy.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

fn parse_rule_symlink(value: &str) -> Option<EnumCopySymlinkStrategy> {
    match value {
        "shallow" => Some(EnumCopySymlinkStrategy::Shallow),
        "deep" => Some(EnumCopySymlinkStrategy::Deep),
        "skip" => Some(EnumCopySymlinkStrategy::Skip),
        _ => None,
    }
}

/// Ask a Python callable for the strategy of one link.
///
/// A raise or an unknown answer means "leave this link alone".
fn call_on_symlink(on_symlink: &PyObject, path_link: &Path) -> EnumCopySymlinkStrategy {
    Python::with_gil(|py| {
        let c_path = path_link.to_string_lossy().to_string();
        let res_value = on_symlink
            .call1(py, (c_path,))
            .and_then(|value| value.extract::<String>(py));
        match res_value {
            Ok(value) => parse_rule_symlink(&value).unwrap_or_else(|| {
                warn!(
                    path = %path_link.display(),
                    value = %value,
                    "on_symlink returned an unknown strategy; skipping link"
                );
                EnumCopySymlinkStrategy::Skip
            }),
            Err(e) => {
                warn!(
                    path = %path_link.display(),
                    error = %e,
                    "on_symlink raised; skipping link"
                );
                EnumCopySymlinkStrategy::Skip
            }
        }
    })
}

fn derive_copy_options(
    on_symlink: Option<&Bound<'_, PyAny>>,
    if_preserve_times: bool,
    if_sync: bool,
) -> PyResult<SpecCopyOptions> {
    let spec_cp_options = SpecCopyOptions {
        if_preserve_times,
        if_sync,
        ..SpecCopyOptions::default()
    };

    let Some(on_symlink) = on_symlink else {
        return Ok(spec_cp_options);
    };
    if on_symlink.is_none() {
        return Ok(spec_cp_options);
    }

    if let Ok(value) = on_symlink.downcast::<PyString>() {
        let value = value.to_cow()?;
        let enum_rule_symlink = parse_rule_symlink(&value).ok_or_else(|| {
            PyValueError::new_err(format!(
                "Invalid symlink strategy: `{value}`. Expected one of: ['shallow', 'deep', 'skip']"
            ))
        })?;
        return Ok(spec_cp_options.with_symlink_strategy(enum_rule_symlink));
    }

    if !on_symlink.is_callable() {
        return Err(PyTypeError::new_err(
            "`on_symlink` must be a strategy name or a callable taking a path string.",
        ));
    }
    let on_symlink: PyObject = on_symlink.clone().unbind();
    Ok(spec_cp_options.with_on_symlink(move |path_link| call_on_symlink(&on_symlink, path_link)))
}

fn map_copy_error(exception: CopyError) -> PyErr {
    let message = exception.to_string();
    match exception.kind() {
        io::ErrorKind::NotFound => PyFileNotFoundError::new_err(message),
        io::ErrorKind::PermissionDenied => PyPermissionError::new_err(message),
        io::ErrorKind::AlreadyExists => PyFileExistsError::new_err(message),
        io::ErrorKind::IsADirectory => PyIsADirectoryError::new_err(message),
        io::ErrorKind::NotADirectory => PyNotADirectoryError::new_err(message),
        _ => PyOSError::new_err(message),
    }
}

#[pyfunction(name = "copy")]
#[pyo3(signature = (
    src,
    dst,
    skip = None,
    on_symlink = None,
    if_preserve_times = false,
    if_sync = false
))]
fn copy_py(
    py: Python<'_>,
    src: String,
    dst: String,
    skip: Option<Vec<String>>,
    on_symlink: Option<&Bound<'_, PyAny>>,
    if_preserve_times: bool,
    if_sync: bool,
) -> PyResult<()> {
    let spec_cp_options = derive_copy_options(on_symlink, if_preserve_times, if_sync)?;
    let paths_skip = skip.unwrap_or_default();

    let res_copy = py.allow_threads(|| copy_with_skip(&src, &dst, &paths_skip, &spec_cp_options));
    res_copy.map_err(map_copy_error)
}

#[pymodule]
fn _copykit_fs_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(copy_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
