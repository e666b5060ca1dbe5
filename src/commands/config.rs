use anyhow::{Context as _, Result, bail};
use std::path::Path;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::SondaConfig;
use crate::{paths, ui};

pub fn run(_ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    let path = paths::config_file()?;
    match cmd {
        ConfigCommand::Show => show(&path),
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => init(&path, force),
    }
}

fn show(path: &Path) -> Result<()> {
    let config = SondaConfig::load_from(path)?;

    ui::header("Configuration");
    ui::kv("Config file", &path.display().to_string());
    if !path.exists() {
        ui::info("No config file found, showing defaults");
    }
    println!();
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    for line in rendered.lines() {
        println!("  {line}");
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    SondaConfig::default().save_to(path)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}
