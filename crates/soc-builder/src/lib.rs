//! Artifact generation for the ice40-hx8k SoC: loads a platform, assembles it
//! and writes linker, header, CSV and JSON descriptions.

use clap as _;
use env_logger as _;

/// Linker script, C header, CSV and JSON renderers.
pub mod artifacts;
pub use artifacts::{
    render, render_csr_csv, render_linker_regions, render_mem_header, render_memory_map_json,
    render_soc_header, ArtifactKind,
};

/// Platform loading and artifact output.
pub mod builder;
pub use builder::{assemble_platform, build, load_platform, write_artifacts, BuildReport};

/// Reset timing traces.
pub mod trace;
pub use trace::{trace_reset, RequestWindow, ResetEvent};

#[cfg(test)]
use tempfile as _;
