use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::confirm::{PromptBackend, PromptStatus};

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub json: bool,     // global --json
}

#[derive(Parser)]
#[command(name = "egate")]
#[command(about = "Confirmation-gated file edits, writes and patches for coding agents")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Print tool results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log progress to stderr (EDITGATE_LOG / RUST_LOG take precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Settings that take precedence over config files and environment
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Config file (default: first of editgate.toml|yaml|json, .editgate.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Shared confirmation log
    #[arg(long, global = true)]
    pub prompt_log: Option<PathBuf>,

    /// Audit log of committed changes
    #[arg(long, global = true)]
    pub change_log: Option<PathBuf>,

    /// Where confirmations may come from
    #[arg(long, global = true, value_enum)]
    pub prompt_backend: Option<BackendArg>,

    /// Require confirmation for every change
    #[arg(long, global = true, conflicts_with = "no_confirm")]
    pub confirm: bool,

    /// Never ask for confirmation
    #[arg(long, global = true)]
    pub no_confirm: bool,

    /// Run id stamped on every record
    #[arg(long, global = true)]
    pub run_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replace text in a file (empty --old creates the file)
    Edit(EditCmd),

    /// Overwrite or append to a file
    Write(WriteCmd),

    /// Delete a file or directory
    Delete(DeleteCmd),

    /// Apply a unified diff or a `*** Begin Patch` patch
    Patch(PatchCmd),

    /// Run one tool call read as JSON from stdin: {"tool": ..., "arguments": {...}}
    Call(CallCmd),

    /// Answer a pending confirmation request
    Respond(RespondArgs),

    /// List confirmation requests without an answer
    Pending,

    /// Wait for the answer to a confirmation request
    Await(AwaitArgs),

    /// Initialize an editgate.toml config file
    Init(InitArgs),
}

#[derive(Parser)]
pub struct EditCmd {
    /// File path relative to the workspace root
    pub path: String,

    /// Exact text to replace; empty creates a new file
    #[arg(long, default_value = "", conflicts_with = "old_file")]
    pub old: String,

    /// Read the text to replace from a file
    #[arg(long)]
    pub old_file: Option<PathBuf>,

    /// Replacement text
    #[arg(long, required_unless_present = "new_file", conflicts_with = "new_file")]
    pub new: Option<String>,

    /// Read the replacement text from a file
    #[arg(long)]
    pub new_file: Option<PathBuf>,

    /// Number of matches the edit must hit
    #[arg(long, default_value = "1")]
    pub expected: usize,
}

#[derive(Parser)]
pub struct WriteCmd {
    /// File path relative to the workspace root
    pub path: String,

    /// Content to write (default: read stdin)
    #[arg(long, conflicts_with = "from")]
    pub contents: Option<String>,

    /// Read content from a file
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Append instead of overwriting
    #[arg(long)]
    pub append: bool,
}

#[derive(Parser)]
pub struct DeleteCmd {
    /// File or directory relative to the workspace root
    pub path: String,
}

#[derive(Parser)]
pub struct PatchCmd {
    /// Patch file (default: read stdin)
    pub patch: Option<PathBuf>,

    /// Working directory hint relative to the workspace root
    #[arg(long, default_value = ".")]
    pub dir: String,
}

#[derive(Parser)]
pub struct CallCmd {
    /// Read the call from a file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RespondArgs {
    /// Request id from `egate pending`
    pub request_id: String,

    /// Decision to record
    #[arg(long, value_enum, default_value = "ok")]
    pub status: StatusArg,

    /// Optional note passed back to the agent
    #[arg(long, default_value = "")]
    pub remark: String,
}

#[derive(Parser)]
pub struct AwaitArgs {
    /// Request id to wait on
    pub request_id: String,

    /// Give up after this many seconds and report `timeout`
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Auto,
    Tty,
    File,
}

impl From<BackendArg> for PromptBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => PromptBackend::Auto,
            BackendArg::Tty => PromptBackend::Tty,
            BackendArg::File => PromptBackend::File,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Ok,
    Canceled,
    Timeout,
}

impl From<StatusArg> for PromptStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Ok => PromptStatus::Ok,
            StatusArg::Canceled => PromptStatus::Canceled,
            StatusArg::Timeout => PromptStatus::Timeout,
        }
    }
}
