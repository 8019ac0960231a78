//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, RemoteConfig};
use crate::error::HoardResult;
use crate::location::Location;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    ctx: &UiContext,
) -> HoardResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(&manager.load().await?)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Remote { name, url, default }) => {
            set_remote(manager, ctx, &name, &url, default).await?
        }
    }
    Ok(())
}

fn show_config(config: &Config) -> HoardResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn set_remote(
    manager: &ConfigManager,
    ctx: &UiContext,
    name: &str,
    url: &str,
    default: bool,
) -> HoardResult<()> {
    Location::parse(url)?;

    let mut config = manager.load().await?;
    let entry = config.remote.entry(name.to_string()).or_insert_with(|| RemoteConfig {
        url: url.to_string(),
        ..Default::default()
    });
    entry.url = url.to_string();
    if default {
        config.core.remote = Some(name.to_string());
    }
    manager.save(&config).await?;

    ui::step_ok_detail(
        ctx,
        &format!("Remote '{}' set to {}", name, url),
        &manager.path().display().to_string(),
    );
    Ok(())
}
