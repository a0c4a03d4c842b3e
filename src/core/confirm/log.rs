//! Shared prompt log.
//!
//! Requests and responses are JSON Lines appended to one file that any
//! number of processes (this tool, a UI, `egate respond`) may write. The
//! log is always re-scanned in full; the last response carrying a given
//! `requestId` is authoritative.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::infra::io::{append_jsonl, read_jsonl};

pub const RECORD_TYPE: &str = "ui_prompt";
pub const PROMPT_KIND: &str = "file_change_confirm";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Ok,
    Canceled,
    Timeout,
}

impl PromptStatus {
    /// Lenient parse of a logged status. Anything unrecognised, including
    /// a missing value, is a cancellation.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("ok") => PromptStatus::Ok,
            Some("timeout") => PromptStatus::Timeout,
            _ => PromptStatus::Canceled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromptStatus::Ok => "ok",
            PromptStatus::Canceled => "canceled",
            PromptStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a request record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayload {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub allow_cancel: bool,
    pub source: String,
    pub path: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub cwd: String,
    pub diff: String,
}

/// Body of a response record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptAnswer {
    pub status: PromptStatus,
    #[serde(default)]
    pub remark: String,
}

impl PromptAnswer {
    pub fn new(status: PromptStatus, remark: impl Into<String>) -> Self {
        Self {
            status,
            remark: remark.into(),
        }
    }

    fn from_record(record: &Value) -> Self {
        let response = record.get("response");
        let status = PromptStatus::parse(
            response
                .and_then(|r| r.get("status"))
                .and_then(Value::as_str),
        );
        let remark = response
            .and_then(|r| r.get("remark"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::new(status, remark)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Record<'a, B: Serialize> {
    ts: String,
    #[serde(rename = "type")]
    record_type: &'static str,
    action: &'static str,
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    #[serde(flatten)]
    body: B,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    prompt: &'a PromptPayload,
}

#[derive(Serialize)]
struct ResponseBody<'a> {
    response: &'a PromptAnswer,
}

/// A request with no response yet.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingPrompt {
    pub request_id: String,
    pub ts: String,
    pub title: String,
    pub path: String,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_prompt(record: &Value, action: &str) -> bool {
    record.get("type").and_then(Value::as_str) == Some(RECORD_TYPE)
        && record.get("action").and_then(Value::as_str) == Some(action)
}

fn request_id(record: &Value) -> Option<&str> {
    record.get("requestId").and_then(Value::as_str)
}

#[derive(Debug, Clone)]
pub struct PromptLog {
    path: PathBuf,
    run_id: Option<String>,
    poll_interval: Duration,
}

impl PromptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_run_id(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<B: Serialize>(&self, action: &'static str, request_id: &str, body: B) -> Result<()> {
        append_jsonl(
            &self.path,
            &Record {
                ts: timestamp(),
                record_type: RECORD_TYPE,
                action,
                request_id,
                run_id: self.run_id.as_deref(),
                body,
            },
        )
    }

    pub fn append_request(&self, request_id: &str, prompt: &PromptPayload) -> Result<()> {
        self.append("request", request_id, RequestBody { prompt })
    }

    pub fn append_response(&self, request_id: &str, answer: &PromptAnswer) -> Result<()> {
        self.append("response", request_id, ResponseBody { response: answer })
    }

    /// Last response recorded for `request_id`, scanning head to tail.
    pub fn find_latest_response(&self, request_id: &str) -> Result<Option<PromptAnswer>> {
        Ok(read_jsonl(&self.path)?
            .iter()
            .filter(|r| is_prompt(r, "response") && self::request_id(r) == Some(request_id))
            .last()
            .map(PromptAnswer::from_record))
    }

    /// Requests that have no response, oldest first.
    pub fn pending(&self) -> Result<Vec<PendingPrompt>> {
        let records = read_jsonl(&self.path)?;
        let answered: HashSet<&str> = records
            .iter()
            .filter(|r| is_prompt(r, "response"))
            .filter_map(request_id)
            .collect();

        Ok(records
            .iter()
            .filter(|r| is_prompt(r, "request"))
            .filter_map(|r| {
                let id = request_id(r)?;
                if answered.contains(id) {
                    return None;
                }
                let field = |name: &str| {
                    r.pointer(&format!("/prompt/{name}"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Some(PendingPrompt {
                    request_id: id.to_string(),
                    ts: r
                        .get("ts")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    title: field("title"),
                    path: field("path"),
                })
            })
            .collect())
    }

    /// Block until a response for `request_id` shows up. Wakes on file
    /// system events and on a fixed tick; never times out.
    pub async fn wait_for_response(&self, request_id: &str) -> PromptAnswer {
        let (tx, mut events) = mpsc::unbounded_channel::<()>();
        let _watcher = self.watch(tx);
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match self.find_latest_response(request_id) {
                Ok(Some(answer)) => {
                    debug!(%request_id, status = %answer.status, "prompt log answered");
                    return answer;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to scan prompt log"),
            }

            tokio::select! {
                _ = tick.tick() => {}
                Some(()) = events.recv() => {}
            }
        }
    }

    /// Watch the log's directory. Any failure leaves polling as the only
    /// wake-up source.
    fn watch(&self, tx: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut watcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(_) => {
                    let _ = tx.send(());
                }
                Err(e) => debug!(error = %e, "prompt log watcher error"),
            }) {
                Ok(w) => w,
                Err(e) => {
                    debug!(error = %e, "prompt log watch unavailable, polling");
                    return None;
                }
            };

        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            debug!(error = %e, dir = %dir.display(), "prompt log watch failed, polling");
            return None;
        }
        Some(watcher)
    }
}
