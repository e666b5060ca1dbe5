use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Result lines
// ============================================================================

/// Print a passing check
pub fn pass(label: &str) {
    println!("  {} {}", "✓".green(), label);
}

/// Print a failing check with the reason dimmed after it
pub fn fail(label: &str, reason: &str) {
    if reason.is_empty() {
        println!("  {} {}", "✗".red(), label);
    } else {
        println!("  {} {} {}", "✗".red(), label, reason.dimmed());
    }
}

/// Print a check that could not be evaluated
pub fn errored(label: &str, err: &str) {
    println!("  {} {} {}", "!".yellow().bold(), label, err.yellow());
}

/// Shorten a rendered value for single-line display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    let single_line = text.replace('\n', "\\n");
    if single_line.chars().count() <= max_len {
        single_line
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = single_line.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
