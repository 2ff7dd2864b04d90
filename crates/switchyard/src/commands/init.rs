use std::path::Path;
use std::process::ExitCode;

use switchyard_core::SwitchyardConfig;

pub fn init(path: &Path, force: bool) -> anyhow::Result<ExitCode> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = SwitchyardConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content)?;
    println!("✓ Generated {}", path.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_loadable_scaffold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");

        init(&path, false).unwrap();
        let (_, settings) = crate::commands::load(&path).unwrap();
        assert_eq!(settings.plan.steps, vec![10, 50, 100]);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        std::fs::write(&path, "# mine").unwrap();

        assert!(init(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        init(&path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[environments.blue]"));
    }
}
