//! Logging setup
//!
//! The engine logs through the `log` facade with a bracketed subsystem
//! prefix (`[DEVICE]`, `[RENDERER]`, ...). `env_logger` is the sink.

pub use log::LevelFilter;

/// Initialize `env_logger` with `default_level`.
///
/// `RUST_LOG` overrides the default when set. Calling this more than once
/// is harmless; later calls are ignored.
pub fn init(default_level: LevelFilter) {
    let result = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Parse a level name from configuration, falling back to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or_else(|_| {
        log::warn!("Unknown log level '{name}', using info");
        LevelFilter::Info
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Debug);
        init(LevelFilter::Trace);
    }
}
