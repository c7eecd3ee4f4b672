pub mod cli;
mod commands;
pub mod config;
mod state;

use tracing_subscriber::EnvFilter;

use gogrepo_tool::{DownloadOptions, UpdateMode, UpdateOptions};

use cli::{Cli, Command};
use config::HubConfig;
use state::HubState;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gogrepo=debug")),
        )
        .init();

    let cfg = HubConfig::load()?;
    tracing::debug!(data_dir = %cfg.data_dir.display(), "configuration loaded");

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let state = HubState::new(cfg)?;

    match cli.command {
        Command::Update {
            os,
            lang,
            skip_known,
            update_only,
            id,
        } => {
            let mode = match (skip_known, update_only, id) {
                (_, _, Some(id)) => UpdateMode::Id(id),
                (true, _, None) => UpdateMode::SkipKnown,
                (false, true, None) => UpdateMode::UpdateOnly,
                (false, false, None) => UpdateMode::Full,
            };
            let opts = UpdateOptions {
                os,
                lang: lang.as_deref().map(UpdateOptions::parse_langs).unwrap_or_default(),
                mode,
            };
            commands::jobs::update(&state, opts).await
        }
        Command::Download {
            dry_run,
            skip_extras,
            skip_games,
            wait,
            id,
            savedir,
        } => {
            let opts = DownloadOptions {
                dry_run,
                skip_extras,
                skip_games,
                wait_hours: wait,
                id,
                save_dir: savedir,
            };
            commands::jobs::download(&state, opts).await
        }
        Command::Login { username, reset } => {
            commands::login::login(&state, username, reset).await
        }
        Command::Info {
            game,
            cover_out,
            json,
        } => commands::games::info(&state, &game, cover_out.as_deref(), json).await,
        Command::Games { json } => commands::games::list(&state, json),
        Command::Cache { action } => commands::games::cache(&state, action),
        Command::Config => Ok(()),
    }
}
