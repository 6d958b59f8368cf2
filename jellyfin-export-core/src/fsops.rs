//! Filesystem primitives used by the exporter.
//!
//! Everything here goes through `tokio::fs` so export jobs never block the
//! runtime on slow NFS mounts.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

use crate::{error::Result, types::EntityId};

/// How exported files reference their source.
///
/// Symlinks only work when Jellyfin sees the same mount layout as the drive
/// host; hardlinks survive NFS exports from another machine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    #[default]
    Hardlink,
    Copy,
    Symlink,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMode::Hardlink => f.write_str("hardlink"),
            LinkMode::Copy => f.write_str("copy"),
            LinkMode::Symlink => f.write_str("symlink"),
        }
    }
}

impl FromStr for LinkMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "hardlink" => Ok(LinkMode::Hardlink),
            "copy" => Ok(LinkMode::Copy),
            "symlink" => Ok(LinkMode::Symlink),
            other => Err(format!("unknown link mode: {other}")),
        }
    }
}

/// What [`link_or_copy`] actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Exists,
    Hardlinked,
    Copied,
    Symlinked,
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// True for anything at `path`, dangling symlinks included.
pub async fn lexists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// True when `path` resolves to an existing file or directory.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(unix)]
pub async fn same_filesystem(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub async fn same_filesystem(_a: &Path, _b: &Path) -> bool {
    false
}

/// True when both paths are the same underlying file (the hardlink case).
#[cfg(unix)]
pub async fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub async fn same_inode(_a: &Path, _b: &Path) -> bool {
    false
}

/// Materialise `src` at `dst`. Hardlinks fall back to a copy when the source
/// lives on another filesystem than `export_root`.
pub async fn link_or_copy(
    src: &Path,
    dst: &Path,
    mode: LinkMode,
    export_root: &Path,
) -> io::Result<LinkOutcome> {
    if lexists(dst).await {
        return Ok(LinkOutcome::Exists);
    }

    let hardlink_ok =
        mode == LinkMode::Hardlink && same_filesystem(src, export_root).await;

    let mode = match mode {
        LinkMode::Hardlink if hardlink_ok => {
            tokio::fs::hard_link(src, dst).await?;
            return Ok(LinkOutcome::Hardlinked);
        }
        LinkMode::Hardlink => {
            debug!(
                target: "export::fs",
                src = %src.display(),
                "source on another filesystem, copying instead of hardlinking"
            );
            LinkMode::Copy
        }
        other => other,
    };

    match mode {
        LinkMode::Copy | LinkMode::Hardlink => {
            tokio::fs::copy(src, dst).await?;
            Ok(LinkOutcome::Copied)
        }
        LinkMode::Symlink => {
            symlink(src, dst).await?;
            Ok(LinkOutcome::Symlinked)
        }
    }
}

#[cfg(unix)]
async fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    tokio::fs::symlink(src, dst).await
}

#[cfg(not(unix))]
async fn symlink(_src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlink exports require a unix host",
    ))
}

/// Remove a previously exported file, symlink or folder. Failures are logged
/// and swallowed; a stale export must never abort a sync run.
pub async fn remove_path_safely(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }

    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return,
    };

    let result = if meta.file_type().is_symlink() || meta.is_file() {
        tokio::fs::remove_file(path).await
    } else if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        Ok(())
    };

    if let Err(err) = result {
        warn!(
            target: "export::fs",
            path = %path.display(),
            error = %err,
            "failed to remove exported path"
        );
    }
}

/// `Title.mkv` becomes `Title__<entity>.mkv` when another entity already owns
/// the destination.
pub fn collision_path(dst: &Path, entity: &EntityId) -> PathBuf {
    let stem = dst
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dst.extension() {
        Some(ext) => format!("{stem}__{entity}.{}", ext.to_string_lossy()),
        None => format!("{stem}__{entity}"),
    };
    dst.with_file_name(name)
}
