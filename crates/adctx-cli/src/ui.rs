//! Shared terminal output helpers.
//!
//! Uses `colored`; everything except errors goes to stdout.

use colored::Colorize;
use std::fmt::Display;

/// Warning line (yellow dash).
pub fn warn(msg: &str) {
    println!("  {} {}", "-".bright_yellow(), msg.yellow());
}

/// Success line (green checkmark).
pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

/// Print an error message to stderr.
pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value". Pass a colored value to
/// highlight it.
pub fn kv(label: &str, value: impl Display) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

/// Hint line: "  hint: message" in dimmed text.
pub fn hint(msg: &str) {
    println!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

/// Yellow warning + "try:" suggestion.
pub fn warn_with_fix(msg: &str, fix: &str) {
    warn(msg);
    println!("    {} {}", "try:".bright_yellow(), fix);
}

/// Empty line.
pub fn blank() {
    println!();
}
