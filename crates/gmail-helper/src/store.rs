//! Token Store
//!
//! Plain JSON token cache, by default under `~/.credentials/`. The file is
//! overwritten wholesale on every save and is readable by the owner only.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenRecord;

const DEFAULT_DIR_NAME: &str = ".credentials";

/// `<home>/.credentials`
pub fn default_directory() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::DirectoryCreate {
        path: PathBuf::from("~").join(DEFAULT_DIR_NAME),
        reason: "could not determine home directory".to_string(),
    })?;
    Ok(home.join(DEFAULT_DIR_NAME))
}

/// Resolve the cache file path, creating its directory when needed.
///
/// The filename is URL-encoded so arbitrary account labels map to a single
/// path component.
pub fn resolve_cache_path(directory: Option<&Path>, filename: &str) -> Result<PathBuf> {
    let dir = match directory {
        Some(dir) => dir.to_path_buf(),
        None => default_directory()?,
    };

    create_private_dir(&dir).map_err(|e| Error::DirectoryCreate {
        path: dir.clone(),
        reason: e.to_string(),
    })?;

    Ok(dir.join(urlencoding::encode(filename).as_ref()))
}

/// Load a cached token. Anything short of a parseable record is a miss.
pub fn load(path: &Path) -> Result<TokenRecord> {
    let miss = |reason: String| Error::CacheMiss {
        path: path.to_path_buf(),
        reason,
    };

    let data = fs::read(path).map_err(|e| miss(e.to_string()))?;
    let record: TokenRecord =
        serde_json::from_slice(&data).map_err(|e| miss(format!("invalid token JSON: {}", e)))?;

    debug!("Loaded cached token from {:?}", path);
    Ok(record)
}

/// Overwrite the cache file with `record`.
pub fn save(path: &Path, record: &TokenRecord) -> Result<()> {
    info!("Saving credential file to: {}", path.display());

    let persist = |source: std::io::Error| Error::CachePersist {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| persist(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut file = open_private_file(path).map_err(persist)?;
    file.write_all(&json).map_err(persist)?;
    file.write_all(b"\n").map_err(persist)?;
    file.sync_all().map_err(persist)?;
    Ok(())
}

/// Delete the cache file. Already gone is fine.
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed cached token at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::CachePersist {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Internal ────────────────────────────────────────────────────────────────

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
