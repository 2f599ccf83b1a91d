//! `bshell`: an interactive shell with process groups, terminal hand-off,
//! pipelines, redirections and a list of launched processes.
//!
//! The read-eval loop lives in [`shell`]; [`parser`] turns a line into a
//! [`command::Command`] and [`exec::Executor`] runs it.

pub mod builtins;
pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod exec;
pub mod list;
pub mod parser;
pub mod shell;
pub mod signals;
pub mod status;
pub mod terminal;
pub mod utils;
