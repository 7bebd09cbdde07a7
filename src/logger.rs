//! Stderr sink for the `log` facade.

/// Writes every enabled record to stderr, prefixed with its level.
pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        log::max_level() >= metadata.level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args())
        }
    }

    fn flush(&self) {}
}

/// Install [`Logger`] with the given level. Later calls only change the level.
pub fn init(level: log::LevelFilter) {
    _ = log::set_logger(&Logger);
    log::set_max_level(level);
}

/// Map `-v`/`-q` counts to a level; warnings are shown by default.
pub fn level_from_verbosity(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Off;
    }
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_from_verbosity(0, false), log::LevelFilter::Warn);
        assert_eq!(level_from_verbosity(2, false), log::LevelFilter::Debug);
        assert_eq!(level_from_verbosity(9, false), log::LevelFilter::Trace);
        assert_eq!(level_from_verbosity(3, true), log::LevelFilter::Off);
    }
}
