//! Interactive terminal channel.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A line-oriented prompt surface. `ask` resolves to `None` on EOF or
/// when `cancel` fires first.
#[async_trait]
pub trait Terminal: Send + Sync {
    fn writeln(&self, line: &str);

    async fn ask(&self, question: &str, cancel: &CancellationToken) -> Option<String>;
}

#[cfg(windows)]
const TTY_PATHS: (&str, &str) = ("CONIN$", "CONOUT$");
#[cfg(not(windows))]
const TTY_PATHS: (&str, &str) = ("/dev/tty", "/dev/tty");

/// The controlling terminal, read by a dedicated thread so a pending
/// read never blocks the runtime.
pub struct TtyTerminal {
    output: Mutex<File>,
    lines: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl TtyTerminal {
    /// `None` when the process has no controlling terminal.
    pub fn open() -> Option<Self> {
        let (input_path, output_path) = TTY_PATHS;
        let input = File::open(input_path).ok()?;
        let output = OpenOptions::new().write(true).open(output_path).ok()?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("egate-tty".into())
            .spawn(move || {
                for line in BufReader::new(input).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .ok()?;

        Some(Self {
            output: Mutex::new(output),
            lines: tokio::sync::Mutex::new(rx),
        })
    }

    fn write(&self, text: &str) {
        if let Ok(mut out) = self.output.lock() {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }
}

#[async_trait]
impl Terminal for TtyTerminal {
    fn writeln(&self, line: &str) {
        self.write(&format!("{line}\n"));
    }

    async fn ask(&self, question: &str, cancel: &CancellationToken) -> Option<String> {
        self.write(question);
        let mut lines = self.lines.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.write("\n");
                None
            }
            line = lines.recv() => line,
        }
    }
}
