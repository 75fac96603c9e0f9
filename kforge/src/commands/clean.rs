//! Remove build outputs

use convenient_osbuild::{BuildConfig, BuildError, BuildResult};
use std::path::Path;
use tracing::info;

/// Remove the output root, and the sysroot when `sysroot` is set
pub async fn run(config: &BuildConfig, sysroot: bool) -> BuildResult<bool> {
    remove_tree(&config.layout.out_dir).await?;
    if sysroot {
        remove_tree(&config.layout.sysroot_dir).await?;
    }
    println!("🧹 Cleaned build outputs");
    Ok(true)
}

async fn remove_tree(dir: &Path) -> BuildResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            info!("Removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::Io(dir.to_path_buf(), e)),
    }
}
