//! Logging utilities with colored scope prefixes.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro for verbose-only output
//!
//! # Example
//!
//! ```ignore
//! log!("update"; "re-require of {} failed: {:#}", id, err);
//! debug!("queue"; "render: task settled");
//! ```

use owo_colors::OwoColorize;
use std::{
    io::{Write, stderr},
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by the embedding host)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored scope prefix
///
/// # Usage
/// ```ignore
/// log!("scope"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($scope:expr; $($arg:tt)*) => {{
        $crate::logger::log($scope, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when verbose mode is enabled)
///
/// # Usage
/// ```ignore
/// debug!("scope"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($scope:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($scope, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored scope prefix
#[inline]
pub fn log(scope: &str, message: &str) {
    let prefix = colorize_prefix(scope);

    let mut stderr = stderr().lock();
    writeln!(stderr, "{prefix} {message}").ok();
    stderr.flush().ok();
}

/// Apply color to a scope prefix based on scope type
#[inline]
fn colorize_prefix(scope: &str) -> String {
    let prefix = format!("[{scope}]");
    match scope {
        "update" => prefix.bright_blue().bold().to_string(),
        "proxy" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_contains_scope() {
        let prefix = colorize_prefix("update");
        assert!(prefix.contains("[update]"));
    }

    #[test]
    fn test_unknown_scope_still_prefixed() {
        let prefix = colorize_prefix("whatever");
        assert!(prefix.contains("[whatever]"));
    }
}
