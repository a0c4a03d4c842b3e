use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::changes::ChangeRecorder;
use crate::core::confirm::{
    ConfirmPolicy, ConfirmationGateway, PromptBackend, PromptLog, SettingsFilePolicy, StaticPolicy,
};
use crate::core::diff::{TTY_DIFF_LIMIT, UI_DIFF_LIMIT};
use crate::core::tools::FileTools;
use crate::infra::workspace::Workspace;

/// Config files looked up in the working directory, first hit wins.
pub const CONFIG_FILES: [&str; 4] = ["editgate.toml", "editgate.yaml", "editgate.json", ".editgate.toml"];

pub const ENV_PREFIX: &str = "EDITGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Workspace root; every tool path resolves inside it (default: cwd)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Name used in prompt sources and change records
    pub server_name: String,

    /// Correlates records written during one agent run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Home of the default logs; `~` is expanded
    pub state_dir: String,

    /// Shared confirmation log (default: <state_dir>/ui-prompts.jsonl)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_log: Option<String>,

    /// Audit log of committed changes (default: <state_dir>/file-changes.jsonl)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_log: Option<String>,

    /// auto | tty | file
    pub prompt_backend: PromptBackend,

    /// Never prompt on the terminal, even when one is attached
    pub disable_tty_prompts: bool,

    /// Prompt log re-scan interval
    pub poll_interval_ms: u64,

    /// Diff cap for request records (characters, 0 = unlimited)
    pub ui_diff_limit: usize,

    /// Diff cap for the terminal prompt (characters, 0 = unlimited)
    pub tty_diff_limit: usize,

    /// Fixed answer to "confirm file changes?"; overrides `settings_file`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_file_changes: Option<bool>,

    /// JSON settings store holding `confirmFileChanges`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_file: Option<String>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            root: None,
            server_name: "code_writer".to_string(),
            run_id: None,
            state_dir: "~/.editgate".to_string(),
            prompt_log: None,
            change_log: None,
            prompt_backend: PromptBackend::Auto,
            disable_tty_prompts: false,
            poll_interval_ms: 800,
            ui_diff_limit: UI_DIFF_LIMIT,
            tty_diff_limit: TTY_DIFF_LIMIT,
            confirm_file_changes: None,
            settings_file: None,
        }
    }
}

fn expand(raw: &str) -> PathBuf
{
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl Config
{
    pub fn state_dir(&self) -> PathBuf
    {
        expand(&self.state_dir)
    }

    pub fn prompt_log_path(&self) -> PathBuf
    {
        match &self.prompt_log
        {
            Some(p) => expand(p),
            None => self
                .state_dir()
                .join("ui-prompts.jsonl"),
        }
    }

    pub fn change_log_path(&self) -> PathBuf
    {
        match &self.change_log
        {
            Some(p) => expand(p),
            None => self
                .state_dir()
                .join("file-changes.jsonl"),
        }
    }

    pub fn workspace(&self) -> Result<Workspace>
    {
        let root = match &self.root
        {
            Some(r) => r.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        Workspace::new(&root)
    }

    pub fn policy(&self) -> Arc<dyn ConfirmPolicy>
    {
        match (self.confirm_file_changes, &self.settings_file)
        {
            (Some(fixed), _) => Arc::new(StaticPolicy(fixed)),
            (None, Some(path)) => Arc::new(SettingsFilePolicy::new(expand(path))),
            (None, None) => Arc::new(StaticPolicy(false)),
        }
    }

    pub fn prompt_log(&self) -> PromptLog
    {
        PromptLog::new(self.prompt_log_path())
            .with_run_id(self.run_id.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    pub fn gateway(&self) -> ConfirmationGateway
    {
        ConfirmationGateway::new(self.policy(), self.prompt_log())
            .with_backend(self.prompt_backend)
            .with_tty_disabled(self.disable_tty_prompts)
            .with_server_name(&self.server_name)
            .with_diff_limits(self.ui_diff_limit, self.tty_diff_limit)
    }

    /// Wire the tool surface from this configuration.
    pub fn tools(&self) -> Result<FileTools>
    {
        let ws = self.workspace()?;
        let recorder = ChangeRecorder::new(self.change_log_path(), ws.root())
            .with_server_name(&self.server_name)
            .with_run_id(self.run_id.clone());
        Ok(FileTools::new(ws, self.gateway(), recorder))
    }
}

/// Layered load: defaults, then the first config file found (or the
/// explicit one), then `EDITGATE_*` environment variables.
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            builder = builder.add_source(config::File::from(path));
        }
        None =>
        {
            if let Some(found) = CONFIG_FILES
                .iter()
                .find(|p| Path::new(p).exists())
            {
                builder = builder.add_source(config::File::with_name(found));
            }
        }
    }

    // Nested keys use a double underscore so field names keep theirs.
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
