use std::io;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Initialise tracing: an hourly, non-blocking file log plus a stderr mirror
///
/// `RUST_LOG` takes precedence over `default_level`. Stdout is left alone so a
/// binary can print its results there. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init(app_name: &str, log_dir: &str, default_level: Level) -> WorkerGuard {
    let (file_writer, guard) = file_writer(app_name, Path::new(log_dir));

    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let file_layer =
        fmt::layer().with_writer(file_writer).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();

    // spans carry method and label, so the thread id adds little here
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false).with_ansi(true).compact();

    tracing_subscriber::registry().with(env_filter).with(file_layer).with(stderr_layer).init();

    guard
}

/// Hourly rolling `<app_name>.log` under `log_dir`, created on demand
fn file_writer(app_name: &str, log_dir: &Path) -> (NonBlocking, WorkerGuard) {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("cannot create log directory {}: {}", log_dir.display(), err);
    }

    let appender = tracing_appender::rolling::hourly(log_dir, format!("{app_name}.log"));
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_file_writer_creates_log_dir() {
        let log_dir = std::env::temp_dir().join(format!("sb_app_logs_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&log_dir);

        let (mut writer, guard) = file_writer("sb_test", &log_dir);
        writer.write_all(b"hello\n").unwrap();
        drop(guard);

        let logs: Vec<_> = std::fs::read_dir(&log_dir).unwrap().filter_map(|entry| entry.ok()).collect();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].file_name().to_string_lossy().starts_with("sb_test.log"));

        let _ = std::fs::remove_dir_all(&log_dir);
    }
}
