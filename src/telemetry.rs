use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize structured logging.
///
/// - `fmt` layer on stdout.
/// - Optional plain-text layer appending to `<dir>/chat_YYYY-MM-DD.log`.
/// - `EnvFilter` from `RUST_LOG`, falling back to `logging.filter`.
pub fn init(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))?;

    let stdout_layer = fmt::layer().with_target(true).compact();

    let file_layer = match &logging.dir {
        Some(dir) => {
            let path = daily_log_path(Path::new(dir), chrono::Local::now().date_naive());
            fs::create_dir_all(dir)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = &logging.dir {
        tracing::info!(name: "telemetry.file", dir = %dir, "Writing logs to daily file");
    }
    Ok(())
}

/// Log file for a given day.
#[must_use]
pub fn daily_log_path(dir: &Path, day: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("chat_{}.log", day.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_named_by_day() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            daily_log_path(Path::new("logs"), day),
            PathBuf::from("logs/chat_2024-03-09.log")
        );
    }
}
