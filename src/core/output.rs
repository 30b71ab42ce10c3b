//! Output formatting for CLI messages outside the status report itself.
//!
//! The report goes to stdout untouched so that `-o json` stays machine readable;
//! errors and warnings go to stderr with a coloured prefix.

use colored::*;

/// Formats and prints an error message with consistent styling
///
/// # Format
/// ```text
/// Error: <message>
/// ```
///
/// # Colors
/// - "Error:" in red
pub fn print_error(message: &str) {
    eprintln!("{}", format_error(message));
}

pub fn format_error(message: &str) -> String {
    format!("{} {}", "Error:".red(), message)
}

/// Prints a problem that does not stop the command, prefixed with "Warning:" in yellow
pub fn print_warning(message: &str) {
    eprintln!("{}", format_warning(message));
}

pub fn format_warning(message: &str) -> String {
    format!("{} {}", "Warning:".yellow(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::templates::strip_ansi_codes;

    #[test]
    fn test_format_error() {
        assert_eq!(
            strip_ansi_codes(&format_error("Not in a kart repository")),
            "Error: Not in a kart repository"
        );
    }

    #[test]
    fn test_format_warning() {
        assert_eq!(
            strip_ansi_codes(&format_warning("Repo config contains unparseable spatial filter")),
            "Warning: Repo config contains unparseable spatial filter"
        );
    }

    #[test]
    fn test_print_error_does_not_panic() {
        print_error("Test error message");
    }
}
