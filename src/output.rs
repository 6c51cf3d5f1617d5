//! Console narration
//!
//! All user-facing progress lines go through here so the binary can stay
//! quiet under `--quiet` and drop ANSI colors when stdout is not a tty.

use atty;

/// Human-readable progress output for resolution and parsing steps
pub struct Output {
    quiet: bool,
    show_colors: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// An output that prints nothing, for exercising narrating code paths
    pub fn silent() -> Self {
        Self {
            quiet: true,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// Print a plain narration line
    pub fn say(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    /// Print a successful resolution: a green check and the request,
    /// then the resolved URI and the local source indented beneath it.
    pub fn resolved(&self, request: &str, result: &str, source: Option<&str>) {
        if self.quiet {
            return;
        }
        println!("{} Resolved: {}", self.colorize("✓", "32"), request);
        println!("        as: {}", result);
        if let Some(source) = source {
            println!("      from: {}", source);
        }
    }

    /// Print a failed resolution
    pub fn missed(&self, request: &str) {
        if !self.quiet {
            println!("{} Resolved: {}", self.colorize("✗", "31"), request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_disabled_returns_plain_text() {
        let output = Output {
            quiet: false,
            show_colors: false,
        };
        assert_eq!(output.colorize("hello", "32"), "hello");
    }

    #[test]
    fn test_colorize_enabled_wraps_with_ansi() {
        let output = Output {
            quiet: false,
            show_colors: true,
        };
        assert_eq!(output.colorize("hello", "32"), "\x1b[32mhello\x1b[0m");
    }
}
