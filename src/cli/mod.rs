//! CLI module for postflow
//!
//! This module provides:
//! - Command implementations (templates, run, history, publish, ...)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling for graceful shutdown

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{AppContext, open_history};
pub use output::{OutputMode, create_handler};
pub use signals::{CancellationToken, setup_signal_handlers};
