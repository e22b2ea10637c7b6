//! Archive download and extraction primitives
//!
//! Downloads go through `ureq` on a blocking worker thread; extraction
//! shells out to the runner's `tar`/`7z`, which are present on every
//! hosted image. Neither primitive retries: a CI minute spent in a
//! silent retry loop hides infrastructure problems, so failures
//! surface immediately.

use crate::error::{RbupError, RbupResult};
use crate::process::{self, RunOpts};
use crate::ui::{DownloadProgress, UiContext};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Last path segment of a URL, without query parts
pub fn url_basename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let url = &url[..end];
    url.rsplit('/').next().unwrap_or(url)
}

/// Archive base name: the basename with its archive extension removed
pub fn archive_base(url: &str) -> String {
    let name = url_basename(url);
    for ext in [".tar.gz", ".tgz", ".7z", ".zip"] {
        if let Some(base) = name.strip_suffix(ext) {
            return base.to_string();
        }
    }
    name.to_string()
}

/// Download `url` into the run's scratch directory and return the
/// local path
pub async fn download(url: &str, ui: &UiContext) -> RbupResult<PathBuf> {
    let dir = std::env::temp_dir().join("rbup-downloads");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| RbupError::io(format!("creating {}", dir.display()), e))?;

    let dest = dir.join(url_basename(url));
    info!("Downloading {}", url);

    let ctx = ui.clone();
    let url_owned = url.to_string();
    let dest_owned = dest.clone();
    tokio::task::spawn_blocking(move || fetch_to_file(&url_owned, &dest_owned, &ctx))
        .await
        .map_err(|e| RbupError::Internal(format!("download task failed: {e}")))??;

    Ok(dest)
}

fn fetch_to_file(url: &str, dest: &Path, ctx: &UiContext) -> RbupResult<()> {
    let failed = |reason: String| RbupError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let mut response = ureq::get(url).call().map_err(|e| failed(e.to_string()))?;

    let total = response.body().content_length();
    let progress = DownloadProgress::new(ctx, url_basename(url), total);

    let mut reader = response.body_mut().as_reader();
    let mut file = std::fs::File::create(dest)
        .map_err(|e| RbupError::io(format!("creating {}", dest.display()), e))?;

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| failed(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| RbupError::io(format!("writing {}", dest.display()), e))?;
        progress.on_chunk(n as u64);
    }
    progress.finish();

    Ok(())
}

/// Unpack a gzipped tarball into `dest_parent`, skipping bundled
/// documentation trees
pub async fn extract_tar_gz(archive: &Path, dest_parent: &Path) -> RbupResult<()> {
    let archive_str = archive.display().to_string();
    let parent_str = dest_parent.display().to_string();

    process::run_checked(
        "tar",
        &[
            "-xz",
            "--exclude",
            "*/share/doc",
            "-C",
            parent_str.as_str(),
            "-f",
            archive_str.as_str(),
        ],
        &RunOpts::quiet(),
    )
    .await
    .map_err(|e| RbupError::ExtractFailed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Unpack a 7z archive into `dest_parent`, skipping the archive's
/// `<base>\share\doc` subtree
pub async fn extract_7z(archive: &Path, dest_parent: &Path, base: &str) -> RbupResult<()> {
    let archive_str = archive.display().to_string();
    let exclude = format!("-xr!{base}\\share\\doc");
    let out = format!("-o{}", dest_parent.display());

    process::run_checked(
        "7z",
        &["x", archive_str.as_str(), exclude.as_str(), out.as_str()],
        &RunOpts::quiet(),
    )
    .await
    .map_err(|e| RbupError::ExtractFailed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })
}
