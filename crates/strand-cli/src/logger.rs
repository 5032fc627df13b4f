//! stderr logger for the `log` facade
//!
//! Level comes from `-v` repetition, or `STRAND_LOG` when no `-v` is given.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

struct StderrLogger {
    color: ColorChoice,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let (tag, color) = match record.level() {
            Level::Error => ("[!]", Color::Red),
            Level::Warn => ("[-]", Color::Yellow),
            Level::Info => ("[*]", Color::Green),
            Level::Debug => ("[#]", Color::Blue),
            Level::Trace => ("[~]", Color::Magenta),
        };

        let mut stderr = StandardStream::stderr(self.color);
        let mut lock = stderr.lock();
        let _ = lock.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(lock, "{}", tag);
        let _ = lock.reset();
        let thread = std::thread::current();
        let _ = writeln!(
            lock,
            " {} {}: {}",
            thread.name().unwrap_or("main"),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Level selected by `STRAND_LOG` (error, warn, info, debug, trace, off)
fn env_level() -> Option<LevelFilter> {
    std::env::var("STRAND_LOG").ok()?.parse().ok()
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => env_level().unwrap_or(LevelFilter::Warn),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. Log records are ignored until this is called.
pub fn init(verbose: u8, color: ColorChoice) {
    let logger = Box::leak(Box::new(StderrLogger { color }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level_for(verbose));
        log::trace!("logger initialized");
    }
}
