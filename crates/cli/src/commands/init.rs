//! `pulsebot init` — write the default configuration file.

use std::path::Path;

use pulsebot_config::Config;

use super::CommandResult;

pub fn run(path: &Path, force: bool) -> CommandResult {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    std::fs::write(path, Config::default_toml())?;
    println!("Wrote default configuration to {}", path.display());
    println!("Set ANTHROPIC_API_KEY (or configure another provider) before `pulsebot run`.");
    Ok(())
}
