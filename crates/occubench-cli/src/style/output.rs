//! Consistent one-line messages.

use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

pub fn print_warn(msg: &str) {
    println!("{} {}", "⚠".warning(), msg);
}

pub fn print_hint(msg: &str) {
    println!("{} {}", "→".muted(), msg.muted());
}

/// Prints a section title followed by a blank line.
pub fn print_section(title: &str) {
    println!();
    println!("{}", title.header());
}

pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}

pub fn print_path(key: &str, path: &std::path::Path) {
    println!("  {}: {}", key.muted(), path.display().code());
}
