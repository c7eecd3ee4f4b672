//! Argument builders for the gogrepo command line.
//!
//! gogrepo is a Python script driven through subcommands:
//!
//! ```text
//! gogrepo.py login
//! gogrepo.py update   [-os ...] [-lang ...] [-skipknown | -updateonly | -id ID]
//! gogrepo.py download [-dryrun] [-skipextras] [-skipgames] [-wait H] [-id ID] [savedir]
//! ```
//!
//! [`Tool`] turns typed option structs into a [`CommandSpec`] that the
//! process supervisor can execute. Nothing here spawns processes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Resource name under which manifest updates are serialized.
pub const RESOURCE_UPDATE: &str = "update";
/// Resource name under which downloads are serialized.
pub const RESOURCE_DOWNLOAD: &str = "download";

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Which subset of the library an `update` refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "id")]
pub enum UpdateMode {
    /// Refresh every owned title.
    #[default]
    Full,
    /// Only add titles missing from the manifest.
    SkipKnown,
    /// Only refresh titles flagged as updated.
    UpdateOnly,
    /// Refresh a single title.
    Id(String),
}

/// Options for `gogrepo update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub os: Vec<String>,
    pub lang: Vec<String>,
    pub mode: UpdateMode,
}

impl UpdateOptions {
    /// Splits a free-form language field (`"en de  fr"`) into codes.
    pub fn parse_langs(input: &str) -> Vec<String> {
        input.split_whitespace().map(str::to_string).collect()
    }
}

/// Options for `gogrepo download`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadOptions {
    pub dry_run: bool,
    pub skip_extras: bool,
    pub skip_games: bool,
    /// Hours to wait before starting.
    pub wait_hours: Option<f64>,
    /// Download a single title.
    pub id: Option<String>,
    /// Target directory; gogrepo defaults to its working directory.
    pub save_dir: Option<PathBuf>,
}

/// Location of the gogrepo script and the interpreter that runs it.
#[derive(Debug, Clone)]
pub struct Tool {
    python: String,
    script: PathBuf,
    data_dir: PathBuf,
}

impl Tool {
    /// Creates a tool description. `data_dir` is used as the working
    /// directory, which is where gogrepo keeps its manifest and cookies.
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `gogrepo login`.
    pub fn login(&self) -> CommandSpec {
        self.command("login", Vec::new())
    }

    /// `gogrepo update` with the given filters.
    pub fn update(&self, opts: &UpdateOptions) -> CommandSpec {
        let mut args = Vec::new();
        let os: Vec<&String> = opts.os.iter().filter(|v| !v.trim().is_empty()).collect();
        if !os.is_empty() {
            args.push("-os".to_string());
            args.extend(os.into_iter().cloned());
        }
        let lang: Vec<&String> = opts.lang.iter().filter(|v| !v.trim().is_empty()).collect();
        if !lang.is_empty() {
            args.push("-lang".to_string());
            args.extend(lang.into_iter().cloned());
        }
        match &opts.mode {
            UpdateMode::Full => {}
            UpdateMode::SkipKnown => args.push("-skipknown".into()),
            UpdateMode::UpdateOnly => args.push("-updateonly".into()),
            UpdateMode::Id(id) => {
                args.push("-id".into());
                args.push(id.clone());
            }
        }
        self.command("update", args)
    }

    /// `gogrepo download` with the given flags.
    pub fn download(&self, opts: &DownloadOptions) -> CommandSpec {
        let mut args = Vec::new();
        if opts.dry_run {
            args.push("-dryrun".to_string());
        }
        if opts.skip_extras {
            args.push("-skipextras".into());
        }
        if opts.skip_games {
            args.push("-skipgames".into());
        }
        if let Some(hours) = opts.wait_hours {
            args.push("-wait".into());
            args.push(hours.to_string());
        }
        if let Some(id) = opts.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            args.push("-id".into());
            args.push(id.to_string());
        }
        if let Some(dir) = &opts.save_dir {
            args.push(dir.display().to_string());
        }
        self.command("download", args)
    }

    fn command(&self, subcommand: &str, extra: Vec<String>) -> CommandSpec {
        let mut args = vec![self.script.display().to_string(), subcommand.to_string()];
        args.extend(extra);
        CommandSpec {
            program: self.python.clone(),
            args,
            cwd: self.data_dir.clone(),
        }
    }
}
