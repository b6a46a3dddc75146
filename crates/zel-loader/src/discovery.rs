//! Driver libraries found on disk.
//!
//! A driver library exports [`DRIVER_ENTRY_SYMBOL`], a Rust-ABI function handing out the
//! driver's [`DriverExports`]. Libraries are searched for in the configured directories and
//! loaded at most once per canonical path.

use std::collections::HashSet;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use thiserror::Error;
use zel_api::ZeResult;
use zel_ddi::{DriverEntryFn, DriverExports, DRIVER_ENTRY_SYMBOL};

use crate::config::LoaderConfig;

/// Library name the null driver builds to, without platform prefix and suffix.
pub const NULL_DRIVER_LIBRARY: &str = "zel_null_driver";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to load driver library {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("driver library {path} does not export `{symbol}`")]
    MissingEntry {
        path: PathBuf,
        symbol: &'static str,
    },
}

impl From<DiscoveryError> for ZeResult {
    fn from(_: DiscoveryError) -> Self {
        ZeResult::ErrorUninitialized
    }
}

/// A loaded driver library. Unloaded on drop, so every [`DriverExports`] it produced must be
/// gone by then.
pub struct DriverLibrary {
    path: PathBuf,
    library: Library,
}

impl DriverLibrary {
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        // SAFETY: loading runs the library's initialisers. Driver libraries are trusted the same
        // way the application trusts the loader itself.
        let library = unsafe { Library::new(path) }.map_err(|source| DiscoveryError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Calls the library's entry point.
    pub fn exports(&self) -> Result<Arc<dyn DriverExports>, DiscoveryError> {
        // SAFETY: `DRIVER_ENTRY_SYMBOL` is declared with the `DriverEntryFn` signature by every
        // driver crate built against `zel-ddi`.
        let entry = unsafe { self.library.get::<DriverEntryFn>(DRIVER_ENTRY_SYMBOL.as_bytes()) }
            .map_err(|_| DiscoveryError::MissingEntry {
                path: self.path.clone(),
                symbol: DRIVER_ENTRY_SYMBOL,
            })?;
        Ok(entry())
    }
}

impl fmt::Debug for DriverLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn library_file_name(stem: &str) -> String {
    format!("{DLL_PREFIX}{stem}{DLL_SUFFIX}")
}

/// Whether `file_name` looks like a driver library: `zel_*driver*` with the platform's
/// library prefix and suffix.
pub fn is_driver_library(file_name: &str) -> bool {
    let Some(stem) = file_name
        .strip_prefix(DLL_PREFIX)
        .and_then(|rest| rest.strip_suffix(DLL_SUFFIX))
    else {
        return false;
    };
    stem.starts_with("zel_") && stem.contains("driver")
}

/// Candidate library paths in search order, de-duplicated by canonical path.
pub fn candidate_paths(config: &LoaderConfig) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in &config.library_paths {
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::debug!(dir = %dir.display(), "skipping unreadable library directory");
            continue;
        };
        let mut names: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(is_driver_library)
            })
            .collect();
        names.sort();
        found.extend(names);
    }

    if config.enable_null_driver {
        let name = library_file_name(NULL_DRIVER_LIBRARY);
        let next_to_loader = config
            .library_paths
            .iter()
            .map(|dir| dir.join(&name))
            .find(|path| path.exists());
        // Fall back to the bare name so the platform search path applies.
        found.push(next_to_loader.unwrap_or_else(|| PathBuf::from(name)));
    }

    dedup_paths(found)
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| {
            let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            seen.insert(key)
        })
        .collect()
}

/// Loads every candidate library. Failures are logged and skipped.
pub fn discover(config: &LoaderConfig) -> Vec<(DriverLibrary, Arc<dyn DriverExports>)> {
    let mut drivers = Vec::new();
    for path in candidate_paths(config) {
        let loaded = DriverLibrary::load(&path).and_then(|library| {
            let exports = library.exports()?;
            Ok((library, exports))
        });
        match loaded {
            Ok((library, exports)) => {
                tracing::debug!(path = %path.display(), driver = exports.name(), "loaded driver library");
                drivers.push((library, exports));
            }
            Err(err) => tracing::warn!(%err, "skipping driver library"),
        }
    }
    drivers
}
