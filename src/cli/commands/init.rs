//! Init command - create the project directory

use crate::cli::args::InitArgs;
use crate::config::{ConfigManager, RemoteConfig};
use crate::error::{HoardError, HoardResult};
use crate::location::Location;
use crate::ui::{self, UiContext};

/// Default name given to the remote passed with `--remote`
const DEFAULT_REMOTE_NAME: &str = "origin";

/// Execute the init command
pub async fn execute(args: InitArgs, ctx: &UiContext) -> HoardResult<()> {
    let cwd =
        std::env::current_dir().map_err(|e| HoardError::io("reading current directory", e))?;
    let mut manager = ConfigManager::with_path(ConfigManager::user_config_path(), cwd);
    let dir = manager.init_project().await?;

    let mut config = manager.load().await?;
    if let Some(url) = args.remote {
        Location::parse(&url)?;
        config.remote.insert(
            DEFAULT_REMOTE_NAME.to_string(),
            RemoteConfig {
                url,
                ..Default::default()
            },
        );
        config.core.remote = Some(DEFAULT_REMOTE_NAME.to_string());
    }
    manager.save(&config).await?;

    ui::step_ok_detail(ctx, "Initialized hoard project", &dir.display().to_string());
    if let Some(remote) = config.default_remote() {
        ui::key_value(ctx, "remote", remote);
    }
    Ok(())
}
