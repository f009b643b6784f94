use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter directives built from `log_level` and `log_targets`.
///
/// `RUST_LOG`, when set, replaces these entirely.
pub fn filter_directives(config: &AppConfig) -> String {
    let targets = &config.log_targets;
    let mut directives = vec![config.log_level.clone()];
    if let Some(level) = &targets.simple_bank {
        directives.push(format!("simple_bank={level}"));
    }
    directives.push(format!("sqlx={}", targets.sqlx));
    directives.extend(targets.extra.iter().cloned());
    directives.join(",")
}

/// Install the global subscriber. Keep the guard alive until shutdown or
/// buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directives = filter_directives(config);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&directives));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        // Text output keeps the target so store and engine lines can be told apart
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    tracing::debug!(filter = %directives, log_dir = %config.log_dir, "Logging initialised");
    guard
}
