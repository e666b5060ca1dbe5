//! Progress indicators for the sonda CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Start a spinner with a message. Hidden when `quiet` is set so JSON
/// output stays clean.
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Stop the spinner and leave a success line
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    if !pb.is_hidden() {
        eprintln!("{} {}", "✓".green(), msg);
    }
}

/// Stop the spinner and leave an error line
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    if !pb.is_hidden() {
        eprintln!("{} {}", "✗".red(), msg);
    }
}
