//! Colored terminal output.
//!
//! Uses `termcolor`. Respects the `NO_COLOR` environment variable and the
//! `--color` flag.

use std::fmt::Display;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled report writer
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    /// Bold section title
    pub fn heading(&mut self, text: &str) {
        let _ = self.stdout.set_color(ColorSpec::new().set_bold(true));
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Aligned `label: value` line
    pub fn field(&mut self, label: &str, value: impl Display) {
        let _ = self.stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
        let _ = write!(self.stdout, "  {:<16}", format!("{}:", label));
        let _ = self.stdout.reset();
        let _ = writeln!(self.stdout, " {}", value);
    }

    /// Green status line
    pub fn success(&mut self, text: &str) {
        let _ = self
            .stdout
            .set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Red `error:` line on stderr
    pub fn error(&mut self, text: &str) {
        let _ = self
            .stderr
            .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(self.stderr, "error:");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, " {}", text);
    }
}
