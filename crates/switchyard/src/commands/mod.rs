pub mod check;
pub mod deploy;
pub mod init;

use std::path::Path;

use anyhow::Context;
use switchyard_core::{OrchestratorConfig, SwitchyardConfig};

/// Read and validate a config file.
pub fn load(path: &Path) -> anyhow::Result<(SwitchyardConfig, OrchestratorConfig)> {
    let file = SwitchyardConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let settings = file
        .orchestrator_config()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok((file, settings))
}
