//! Subcommand handlers behind the `egate` binary.
//!
//! Tool commands print the human summary (or the JSON response with
//! `--json`) on stdout. Exit codes: 0 success, 1 failure, 2 canceled or
//! timed out.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cli::{
    AppContext, AwaitArgs, CallCmd, Cli, Commands, DeleteCmd, EditCmd, Overrides, PatchCmd,
    RespondArgs, WriteCmd,
};
use crate::core::confirm::{PromptAnswer, PromptStatus};
use crate::core::error::MutationError;
use crate::core::tools::{
    DeleteArgs, EditArgs, FileTools, PatchArgs, ToolResponse, WriteArgs, WriteMode, failure_json,
};
use crate::infra::config::{self, Config, load_config};

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CANCELED: u8 = 2;

impl Overrides {
    /// Flags win over files and environment.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(root) = &self.root {
            cfg.root = Some(root.clone());
        }
        if let Some(p) = &self.prompt_log {
            cfg.prompt_log = Some(p.display().to_string());
        }
        if let Some(p) = &self.change_log {
            cfg.change_log = Some(p.display().to_string());
        }
        if let Some(backend) = self.prompt_backend {
            cfg.prompt_backend = backend.into();
        }
        if self.confirm {
            cfg.confirm_file_changes = Some(true);
        } else if self.no_confirm {
            cfg.confirm_file_changes = Some(false);
        }
        if let Some(id) = &self.run_id {
            cfg.run_id = Some(id.clone());
        }
    }
}

/// One tool invocation as accepted by `egate call`.
#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default = "empty_object")]
    arguments: Value,
}

fn empty_object() -> Value {
    json!({})
}

/// Entry point used by `main`.
pub fn run(cli: Cli, ctx: &AppContext) -> Result<ExitCode> {
    let Cli {
        command, overrides, ..
    } = cli;
    let command = match command {
        Commands::Init(args) => {
            config::init(args, ctx)?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let mut cfg = load_config(overrides.config.as_deref())?;
    overrides.apply(&mut cfg);
    debug!(?cfg, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match command {
            Commands::Edit(cmd) => edit_run(cmd, &cfg, ctx).await,
            Commands::Write(cmd) => write_run(cmd, &cfg, ctx).await,
            Commands::Delete(cmd) => delete_run(cmd, &cfg, ctx).await,
            Commands::Patch(cmd) => patch_run(cmd, &cfg, ctx).await,
            Commands::Call(cmd) => call_run(cmd, &cfg).await,
            Commands::Respond(args) => respond_run(args, &cfg, ctx),
            Commands::Pending => pending_run(&cfg, ctx),
            Commands::Await(args) => await_run(args, &cfg, ctx).await,
            Commands::Init(_) => Ok(ExitCode::SUCCESS),
        }
    })
}

fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn check(ctx: &AppContext) -> String {
    if ctx.no_color {
        "✓".to_string()
    } else {
        "✓".green().to_string()
    }
}

fn cross(ctx: &AppContext) -> String {
    if ctx.no_color {
        "✗".to_string()
    } else {
        "✗".yellow().to_string()
    }
}

/// Print a tool result and map it to an exit code.
fn report(
    tool: &str,
    result: Result<ToolResponse, MutationError>,
    ctx: &AppContext,
) -> Result<ExitCode> {
    match result {
        Ok(resp) => {
            let canceled = resp.is_canceled();
            if ctx.json {
                println!("{}", resp.to_json());
            } else if !ctx.quiet || canceled {
                let mark = if canceled { cross(ctx) } else { check(ctx) };
                println!("{mark} {}", resp.text);
            }
            Ok(if canceled {
                ExitCode::from(EXIT_CANCELED)
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(e) if e.is_recoverable() => {
            if ctx.json {
                println!("{}", failure_json(tool, &e));
            } else if ctx.no_color {
                eprintln!("error: {e}");
            } else {
                eprintln!("{} {e}", "error:".red().bold());
            }
            Ok(ExitCode::from(EXIT_FAILURE))
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("{tool} failed"))),
    }
}

async fn edit_run(cmd: EditCmd, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let old_string = match &cmd.old_file {
        Some(p) => read_source(Some(p))?,
        None => cmd.old,
    };
    let new_string = match (&cmd.new_file, cmd.new) {
        (Some(p), _) => read_source(Some(p))?,
        (None, Some(text)) => text,
        (None, None) => anyhow::bail!("--new or --new-file is required"),
    };
    let tools = cfg.tools()?;
    let result = tools
        .edit_file(EditArgs {
            path: cmd.path,
            old_string,
            new_string,
            expected_replacements: Some(cmd.expected),
        })
        .await;
    report("edit_file", result, ctx)
}

async fn write_run(cmd: WriteCmd, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let contents = match cmd.contents {
        Some(text) => text,
        None => read_source(cmd.from.as_deref())?,
    };
    let tools = cfg.tools()?;
    let result = tools
        .write_file(WriteArgs {
            path: cmd.path,
            mode: if cmd.append {
                WriteMode::Append
            } else {
                WriteMode::Overwrite
            },
            contents: Some(contents),
            ..Default::default()
        })
        .await;
    report("write_file", result, ctx)
}

async fn delete_run(cmd: DeleteCmd, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let tools = cfg.tools()?;
    let result = tools.delete_path(DeleteArgs { path: cmd.path }).await;
    report("delete_path", result, ctx)
}

async fn patch_run(cmd: PatchCmd, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let patch = read_source(cmd.patch.as_deref())?;
    let tools = cfg.tools()?;
    let result = tools
        .apply_patch(PatchArgs {
            path: cmd.dir,
            patch: Some(patch),
            ..Default::default()
        })
        .await;
    report("apply_patch", result, ctx)
}

/// `call` always answers in JSON so agents can parse the result.
async fn call_run(cmd: CallCmd, cfg: &Config) -> Result<ExitCode> {
    let raw = read_source(cmd.input.as_deref())?;
    let call: ToolCall = serde_json::from_str(&raw).context("Failed to parse tool call JSON")?;
    let tools: FileTools = cfg.tools()?;
    let ctx = AppContext {
        quiet: false,
        no_color: true,
        json: true,
    };
    let result = tools.call(&call.tool, call.arguments).await;
    report(&call.tool, result, &ctx)
}

fn respond_run(args: RespondArgs, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let log = cfg.prompt_log();
    let waiting = log
        .pending()?
        .iter()
        .any(|p| p.request_id == args.request_id);
    if !waiting {
        info!(request_id = %args.request_id, "no pending request with this id; recording anyway");
    }

    let status: PromptStatus = args.status.into();
    log.append_response(&args.request_id, &PromptAnswer::new(status, args.remark))?;

    if ctx.json {
        println!(
            "{}",
            json!({ "requestId": args.request_id, "status": status, "pending": waiting })
        );
    } else if !ctx.quiet {
        println!("{} Recorded {status} for {}", check(ctx), args.request_id);
    }
    Ok(ExitCode::SUCCESS)
}

fn pending_run(cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let pending = cfg.prompt_log().pending()?;
    if ctx.json {
        println!("{}", serde_json::to_string(&pending)?);
        return Ok(ExitCode::SUCCESS);
    }
    if pending.is_empty() {
        if !ctx.quiet {
            println!("No pending confirmations");
        }
        return Ok(ExitCode::SUCCESS);
    }
    for p in &pending {
        println!("{}  {}  {}  {}", p.request_id, p.ts, p.title, p.path);
    }
    Ok(ExitCode::SUCCESS)
}

async fn await_run(args: AwaitArgs, cfg: &Config, ctx: &AppContext) -> Result<ExitCode> {
    let log = cfg.prompt_log();
    let wait = log.wait_for_response(&args.request_id);
    let answer = match args.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
            .await
            .unwrap_or_else(|_| PromptAnswer::new(PromptStatus::Timeout, "")),
        None => wait.await,
    };

    if ctx.json {
        println!("{}", serde_json::to_string(&answer)?);
    } else if !ctx.quiet || answer.status != PromptStatus::Ok {
        let mark = if answer.status == PromptStatus::Ok {
            check(ctx)
        } else {
            cross(ctx)
        };
        if answer.remark.is_empty() {
            println!("{mark} {}", answer.status);
        } else {
            println!("{mark} {} ({})", answer.status, answer.remark);
        }
    }

    Ok(if answer.status == PromptStatus::Ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_CANCELED)
    })
}
