use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use txguard::config::LoggingConfig;

/// Console logging to stderr (stdout carries command output), plus a daily
/// rolling file when `TXGUARD_LOG_DIR` points at a writable directory.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},txguard=debug,sqlx=warn", logging.level))
    });

    let file_layer = std::env::var("TXGUARD_LOG_DIR").ok().and_then(|log_dir| {
        // `rolling::daily` panics if it cannot create the first file
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Could not create log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let write_test = std::path::Path::new(&log_dir).join(".txguard_write_test");
        if let Err(e) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&write_test)
        {
            eprintln!("Warning: Could not write to log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let _ = std::fs::remove_file(&write_test);

        let file_appender = tracing_appender::rolling::daily(&log_dir, "txguard.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Lives for the rest of the process
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub fn init_logging_simple() {
    // Minimal logging for listing commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}
