// violet ignore chunk
//! ## Features
//!
//! - Levelled logging (verbose, debug, info, success, warn, error)
//! - Multi-line message support with consistent prefixes
//! - A process-wide threshold, set once through [`init`]
//! - All output to stderr, mirrored into `tracing` events under the `bentley` target
//!
//! ## Usage
//!
//! Functions: `info()`, `warn()`, `error()`, `debug()`, `verbose()`, `success()`
//!
//! Macros take format arguments: `bentley::info!("loaded {} songs", count)`

use colored::*;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a log line, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
  Verbose = 0,
  Debug = 1,
  Info = 2,
  Success = 3,
  Warn = 4,
  Error = 5,
}

impl Level {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => Level::Verbose,
      1 => Level::Debug,
      2 => Level::Info,
      3 => Level::Success,
      4 => Level::Warn,
      _ => Level::Error,
    }
  }

  fn tag(self) -> &'static str {
    match self {
      Level::Verbose => "verb",
      Level::Debug => "debug",
      Level::Info => "info",
      Level::Success => "sccs",
      Level::Warn => "warn",
      Level::Error => "error",
    }
  }

  fn color(self) -> Color {
    match self {
      Level::Verbose => Color::Cyan,
      Level::Debug => Color::Magenta,
      Level::Info => Color::Blue,
      Level::Success => Color::Green,
      Level::Warn => Color::Yellow,
      Level::Error => Color::Red,
    }
  }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Initialize Bentley with the lowest level that should reach stderr
pub fn init(threshold: Level) {
  THRESHOLD.store(threshold as u8, Ordering::Relaxed);
}

/// Current stderr threshold
pub fn threshold() -> Level {
  Level::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

/// Whether a line at `level` is printed to stderr
pub fn enabled(level: Level) -> bool {
  level >= threshold()
}

/// Format a colored prefix for log messages
fn format_prefix(color: Color, prefix: &str) -> String {
  let pad = 7usize.saturating_sub(prefix.len() + 2);
  format!("[{}]{:<pad$}", prefix.color(color).bold(), "")
}

/// Render a message into the prefixed lines that would be printed
pub fn render(level: Level, message: &str) -> Vec<String> {
  let prefix = format_prefix(level.color(), level.tag());
  message.lines().map(|line| format!("{prefix} {line}")).collect()
}

/// Core logging function that handles the actual output
pub fn log(level: Level, message: &str) {
  mirror(level, message);

  if !enabled(level) {
    return;
  }

  for line in render(level, message) {
    eprintln!("{line}");
  }
}

fn mirror(level: Level, message: &str) {
  match level {
    Level::Verbose => tracing::trace!(target: "bentley", "{message}"),
    Level::Debug => tracing::debug!(target: "bentley", "{message}"),
    Level::Info | Level::Success => tracing::info!(target: "bentley", "{message}"),
    Level::Warn => tracing::warn!(target: "bentley", "{message}"),
    Level::Error => tracing::error!(target: "bentley", "{message}"),
  }
}

pub fn verbose(message: &str) {
  log(Level::Verbose, message);
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  log(Level::Debug, message);
}

/// Info level logging - general information
pub fn info(message: &str) {
  log(Level::Info, message);
}

/// Success level logging - something completed successfully
pub fn success(message: &str) {
  log(Level::Success, message);
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  log(Level::Warn, message);
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  log(Level::Error, message);
}

/// Macros for coverage-excluded logging - these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! verbose {
  ($($arg:tt)*) => {
    $crate::verbose(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => {
    $crate::debug(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => {
    $crate::info(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => {
    $crate::success(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($($arg:tt)*) => {
    $crate::warn(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => {
    $crate::error(&format!($($arg)*)); // LCOV_EXCL_LINE
  };
}
