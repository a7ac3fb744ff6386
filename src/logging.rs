use log::LevelFilter;

/// `Info` by default; each `-v` raises it one level. `RUST_LOG` still wins.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbosity: u8) {
    let result = env_logger::Builder::new()
        .filter_level(level_for(verbosity))
        .parse_default_env()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialised");
    }
}
