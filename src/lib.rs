//! **editgate** - Confirmation-gated file mutation for agent-driven edits
//!
//! Every write, edit, delete and patch is computed in memory, shown to a
//! human as a diff, re-checked against the disk after approval, committed
//! atomically and recorded in an append-only audit log.

/// Command-line interface with clap integration
pub mod cli;

/// Subcommand handlers and exit-code mapping
pub mod commands;

/// Core mutation pipeline
pub mod core {
    /// Failure kinds shared by every tool
    pub mod error;
    pub use error::{MutationError, Strategy};

    /// Content snapshots and fingerprints (blake3)
    pub mod snapshot;
    pub use snapshot::FileSnapshot;

    /// Exact, whitespace-flexible and token-regex replacement
    pub mod matcher;

    /// Unified diff rendering and truncation
    pub mod diff;

    /// Unified and `*** Begin Patch` parsing, validation and in-memory application
    pub mod patch;

    /// Inline, base64 and chunked payload decoding
    pub mod payload;

    /// Human approval through the terminal and the shared prompt log
    pub mod confirm;
    pub use confirm::{ConfirmationGateway, PromptBackend, PromptLog};

    /// Re-verification of targets between approval and commit
    pub mod guard;

    /// Append-only audit of committed changes
    pub mod changes;
    pub use changes::ChangeRecorder;

    /// The four mutating tools
    pub mod tools;
    pub use tools::{FileTools, ToolResponse};
}

/// Infrastructure - Configuration, I/O, logging and workspace paths
pub mod infra {
    /// Layered configuration (file, environment, flags)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes, line endings and locked JSONL appends
    pub mod io;

    /// Tracing subscriber setup
    pub mod logging;

    /// Workspace root confinement
    pub mod workspace;
    pub use workspace::Workspace;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{ConfirmationGateway, FileTools, MutationError, ToolResponse};
pub use infra::{Config, Workspace, load_config};
