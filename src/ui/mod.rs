// UI module - terminal front-end
//
// This module contains:
// - Console: line-oriented command loop over the ScanController and ItemStore
// - describe_event: rendering of session events for the terminal

pub mod console;

pub use console::{Command, CommandError, CommandParser, Console, Flow, describe_event, run_console};
