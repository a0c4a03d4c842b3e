//! Confirmation gateway.
//!
//! A mutation that needs approval is announced as a request record in the
//! shared prompt log. The answer comes from the controlling terminal, from
//! a response record written by another process, or from whichever of
//! the two settles first.

pub mod log;
pub mod policy;
pub mod terminal;

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use log::{PendingPrompt, PromptAnswer, PromptLog, PromptPayload, PromptStatus};
pub use policy::{ConfirmPolicy, SettingsFilePolicy, StaticPolicy};
pub use terminal::{Terminal, TtyTerminal};

use crate::core::diff::{TTY_DIFF_LIMIT, UI_DIFF_LIMIT, truncate_for_ui};

/// Which channels may answer a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PromptBackend {
    /// Race the terminal against the log when a terminal exists.
    #[default]
    Auto,
    Tty,
    File,
}

impl PromptBackend {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tty" | "terminal" | "console" | "cli" => PromptBackend::Tty,
            "file" | "ui" | "jsonl" | "log" => PromptBackend::File,
            _ => PromptBackend::Auto,
        }
    }
}

impl From<String> for PromptBackend {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

/// What the caller wants approved.
#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    pub path: String,
    pub command: String,
    pub cwd: String,
    pub source: String,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    /// `Ok` or `Canceled`; other logged statuses collapse to `Canceled`.
    pub status: PromptStatus,
    /// `None` when policy did not require a prompt.
    pub request_id: Option<String>,
    pub remark: String,
}

impl ConfirmationOutcome {
    /// Outcome when policy does not ask anyone.
    pub fn not_required() -> Self {
        Self {
            status: PromptStatus::Ok,
            request_id: None,
            remark: String::new(),
        }
    }

    fn answered(request_id: String, answer: PromptAnswer) -> Self {
        let status = match answer.status {
            PromptStatus::Ok => PromptStatus::Ok,
            _ => PromptStatus::Canceled,
        };
        Self {
            status,
            request_id: Some(request_id),
            remark: answer.remark,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PromptStatus::Ok
    }

    /// A human actually approved.
    pub fn confirmed(&self) -> bool {
        self.is_ok() && self.request_id.is_some()
    }
}

pub struct ConfirmationGateway {
    policy: Arc<dyn ConfirmPolicy>,
    log: PromptLog,
    backend: PromptBackend,
    tty_disabled: bool,
    terminal: Option<Arc<dyn Terminal>>,
    /// Controlling terminal, opened on first use and shared by every prompt.
    tty: OnceLock<Option<Arc<dyn Terminal>>>,
    server_name: String,
    ui_diff_limit: usize,
    tty_diff_limit: usize,
}

impl ConfirmationGateway {
    pub fn new(policy: Arc<dyn ConfirmPolicy>, log: PromptLog) -> Self {
        Self {
            policy,
            log,
            backend: PromptBackend::Auto,
            tty_disabled: false,
            terminal: None,
            tty: OnceLock::new(),
            server_name: "code_writer".to_string(),
            ui_diff_limit: UI_DIFF_LIMIT,
            tty_diff_limit: TTY_DIFF_LIMIT,
        }
    }

    pub fn with_backend(mut self, backend: PromptBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_tty_disabled(mut self, disabled: bool) -> Self {
        self.tty_disabled = disabled;
        self
    }

    /// Use `terminal` instead of opening the controlling terminal.
    pub fn with_terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_diff_limits(mut self, ui: usize, tty: usize) -> Self {
        self.ui_diff_limit = ui;
        self.tty_diff_limit = tty;
        self
    }

    pub fn log(&self) -> &PromptLog {
        &self.log
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    fn terminal(&self) -> Option<Arc<dyn Terminal>> {
        if self.tty_disabled || self.backend == PromptBackend::File {
            return None;
        }
        self.terminal.clone().or_else(|| {
            self.tty
                .get_or_init(|| TtyTerminal::open().map(|t| Arc::new(t) as Arc<dyn Terminal>))
                .clone()
        })
    }

    /// Ask for approval when policy requires it. Waits as long as it takes
    /// for a human; only the request append can fail.
    pub async fn confirm(&self, req: &ConfirmRequest) -> Result<ConfirmationOutcome> {
        if !self.policy.confirmation_required() {
            debug!(path = %req.path, "confirmation not required");
            return Ok(ConfirmationOutcome::not_required());
        }

        let request_id = Uuid::new_v4().to_string();
        let prompt = PromptPayload {
            kind: log::PROMPT_KIND.to_string(),
            title: if req.title.is_empty() {
                "File change confirmation".to_string()
            } else {
                req.title.clone()
            },
            message: req.message.clone(),
            allow_cancel: true,
            source: req.source.clone(),
            path: req.path.clone(),
            command: req.command.clone(),
            cwd: req.cwd.clone(),
            diff: truncate_for_ui(&req.diff, self.ui_diff_limit),
        };
        self.log.append_request(&request_id, &prompt)?;
        info!(%request_id, path = %req.path, "awaiting confirmation");

        let answer = match self.terminal() {
            None => self.log.wait_for_response(&request_id).await,
            Some(term) if self.backend == PromptBackend::Tty => {
                let never = CancellationToken::new();
                match self.ask_terminal(term.as_ref(), &prompt, &req.diff, &never).await {
                    Some(answer) => self.settle_terminal_answer(&request_id, answer),
                    None => PromptAnswer::new(PromptStatus::Canceled, ""),
                }
            }
            Some(term) => {
                self.race(term.as_ref(), &request_id, &prompt, &req.diff)
                    .await
            }
        };

        let outcome = ConfirmationOutcome::answered(request_id, answer);
        info!(
            request_id = outcome.request_id.as_deref().unwrap_or_default(),
            status = %outcome.status,
            "confirmation resolved"
        );
        Ok(outcome)
    }

    /// First settled channel wins. A terminal that goes quiet (EOF or
    /// canceled) defers to the log.
    async fn race(
        &self,
        term: &dyn Terminal,
        request_id: &str,
        prompt: &PromptPayload,
        diff: &str,
    ) -> PromptAnswer {
        let cancel = CancellationToken::new();
        let from_log = self.log.wait_for_response(request_id);
        let from_tty = self.ask_terminal(term, prompt, diff, &cancel);
        tokio::pin!(from_log);
        tokio::pin!(from_tty);

        tokio::select! {
            biased;
            answer = &mut from_log => {
                cancel.cancel();
                debug!(%request_id, "answered from prompt log");
                answer
            }
            answer = &mut from_tty => match answer {
                Some(answer) => {
                    debug!(%request_id, "answered from terminal");
                    self.settle_terminal_answer(request_id, answer)
                }
                None => from_log.await,
            },
        }
    }

    /// A response already in the log wins over the terminal; otherwise
    /// the terminal answer is appended and becomes the decision.
    fn settle_terminal_answer(&self, request_id: &str, answer: PromptAnswer) -> PromptAnswer {
        match self.log.find_latest_response(request_id) {
            Ok(Some(logged)) => {
                debug!(%request_id, status = %logged.status, "log answered first, terminal answer dropped");
                return logged;
            }
            Ok(None) => {}
            Err(e) => warn!(%request_id, error = %e, "failed to scan prompt log"),
        }
        if let Err(e) = self.log.append_response(request_id, &answer) {
            warn!(%request_id, error = %e, "failed to log terminal answer");
        }
        answer
    }

    async fn ask_terminal(
        &self,
        term: &dyn Terminal,
        prompt: &PromptPayload,
        diff: &str,
        cancel: &CancellationToken,
    ) -> Option<PromptAnswer> {
        term.writeln("");
        term.writeln(&format!("[{}] {}", self.server_name, prompt.title.bold()));
        term.writeln("Confirm here or in the UI: type y to proceed, press Enter to cancel.");
        if !prompt.message.is_empty() {
            term.writeln(&prompt.message);
        }
        if !prompt.cwd.is_empty() {
            term.writeln(&format!("cwd: {}", prompt.cwd));
        }
        if !prompt.command.is_empty() {
            term.writeln(&format!("$ {}", prompt.command));
        }
        if !prompt.path.is_empty() {
            term.writeln(&format!("path: {}", prompt.path));
        }
        if !prompt.source.is_empty() {
            term.writeln(&format!("source: {}", prompt.source));
        }

        let shown = truncate_for_ui(diff, self.tty_diff_limit);
        if !shown.trim().is_empty() {
            term.writeln("");
            term.writeln("--- diff (truncated) ---");
            term.writeln(shown.trim_end());
            term.writeln("--- end diff ---");
        }

        let answer = term.ask("Proceed? (y/N) ", cancel).await?;
        let ok = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        let remark = term.ask("Remark (optional): ", cancel).await?;

        let status = if ok {
            PromptStatus::Ok
        } else {
            PromptStatus::Canceled
        };
        Some(PromptAnswer::new(status, remark.trim()))
    }
}
