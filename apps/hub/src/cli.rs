use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gogrepo hub - run library jobs and browse game metadata
#[derive(Parser, Debug)]
#[command(name = "gogrepo-hub")]
#[command(version)]
#[command(about = "Run gogrepo jobs with live progress and browse cached game metadata", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the manifest (`gogrepo update`)
    Update {
        /// Operating systems to include (e.g. windows linux)
        #[arg(long = "os", num_args = 1..)]
        os: Vec<String>,

        /// Languages to include, space separated (e.g. "en de")
        #[arg(long = "lang")]
        lang: Option<String>,

        /// Only add titles missing from the manifest
        #[arg(long = "skipknown", conflicts_with_all = ["update_only", "id"])]
        skip_known: bool,

        /// Only refresh titles flagged as updated
        #[arg(long = "updateonly", conflicts_with = "id")]
        update_only: bool,

        /// Refresh a single title
        #[arg(long = "id")]
        id: Option<String>,
    },

    /// Download game files (`gogrepo download`)
    Download {
        /// Show what would be downloaded
        #[arg(long = "dryrun")]
        dry_run: bool,

        /// Skip extras
        #[arg(long = "skipextras")]
        skip_extras: bool,

        /// Skip game installers
        #[arg(long = "skipgames")]
        skip_games: bool,

        /// Hours to wait before starting
        #[arg(long = "wait")]
        wait: Option<f64>,

        /// Download a single title
        #[arg(long = "id")]
        id: Option<String>,

        /// Target directory
        savedir: Option<PathBuf>,
    },

    /// Log in to GOG (`gogrepo login`), prompting for a second factor if needed
    Login {
        /// GOG username; prompted for when absent
        #[arg(long = "username")]
        username: Option<String>,

        /// Forget any pending attempt first
        #[arg(long = "reset")]
        reset: bool,
    },

    /// Show a game's description and cover
    Info {
        /// Title slug as listed by `games`
        game: String,

        /// Write the cover image to this file
        #[arg(long = "cover-out")]
        cover_out: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long = "json")]
        json: bool,
    },

    /// List games in the manifest
    Games {
        /// Print JSON instead of text
        #[arg(long = "json")]
        json: bool,
    },

    /// Inspect or clear the metadata cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Bytes used on disk
    Size,
    /// Remove every cached entry
    Clear,
    /// Remove one game's entries
    Invalidate { game: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_flags() {
        let cli = Cli::try_parse_from([
            "gogrepo-hub",
            "update",
            "--os",
            "windows",
            "linux",
            "--lang",
            "en de",
            "--skipknown",
        ])
        .unwrap();
        match cli.command {
            Command::Update {
                os,
                lang,
                skip_known,
                ..
            } => {
                assert_eq!(os, ["windows", "linux"]);
                assert_eq!(lang.as_deref(), Some("en de"));
                assert!(skip_known);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_modes_conflict() {
        assert!(
            Cli::try_parse_from(["gogrepo-hub", "update", "--skipknown", "--id", "x"]).is_err()
        );
    }

    #[test]
    fn job_commands_run_in_the_foreground() {
        // Jobs live only as long as the command that started them.
        assert!(Cli::try_parse_from(["gogrepo-hub", "status", "update"]).is_err());
    }

    #[test]
    fn parses_download_savedir() {
        let cli =
            Cli::try_parse_from(["gogrepo-hub", "download", "--dryrun", "/games"]).unwrap();
        match cli.command {
            Command::Download {
                dry_run, savedir, ..
            } => {
                assert!(dry_run);
                assert_eq!(savedir, Some(PathBuf::from("/games")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
