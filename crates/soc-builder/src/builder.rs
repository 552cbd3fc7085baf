//! Configuration loading and artifact output.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use soc_core::{assemble, load_platform_toml, PlatformConfig, SocDescription};

use crate::artifacts::{render, ArtifactKind};

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Assembled SoC.
    pub soc: SocDescription,
    /// Files written, in [`ArtifactKind::ALL`] order.
    pub written: Vec<PathBuf>,
}

/// Loads the platform at `path`, or the board defaults when `path` is `None`.
///
/// # Errors
///
/// Fails when the file is missing, malformed or structurally invalid.
pub fn load_platform(path: Option<&Path>) -> Result<PlatformConfig> {
    match path {
        Some(path) => {
            info!("loading platform from {}", path.display());
            load_platform_toml(path)
                .with_context(|| format!("failed to load platform {}", path.display()))
        }
        None => {
            debug!("using built-in ice40-hx8k platform");
            Ok(PlatformConfig::default())
        }
    }
}

/// Loads and assembles a platform.
///
/// # Errors
///
/// Fails on any configuration or assembly error.
pub fn assemble_platform(path: Option<&Path>) -> Result<SocDescription> {
    let platform = load_platform(path)?;
    assemble(&platform).context("SoC assembly failed")
}

/// Renders every artifact into `out_dir`, creating it when needed.
///
/// # Errors
///
/// Fails when the directory cannot be created or a file cannot be written.
pub fn write_artifacts(soc: &SocDescription, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    ArtifactKind::ALL
        .iter()
        .map(|&kind| {
            let path = out_dir.join(kind.file_name());
            let text = render(kind, soc)
                .with_context(|| format!("failed to render {}", kind.file_name()))?;
            fs::write(&path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            debug!("wrote {}", path.display());
            Ok(path)
        })
        .collect()
}

/// Loads, assembles and writes every artifact.
///
/// # Errors
///
/// Fails on the first configuration, assembly or I/O error.
pub fn build(config: Option<&Path>, out_dir: &Path) -> Result<BuildReport> {
    let soc = assemble_platform(config)?;
    let written = write_artifacts(&soc, out_dir)?;
    info!(
        "wrote {} artifacts for {} to {}",
        written.len(),
        soc.device,
        out_dir.display()
    );
    Ok(BuildReport { soc, written })
}
