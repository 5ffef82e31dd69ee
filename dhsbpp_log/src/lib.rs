use std::path::Path;

use anyhow::Result;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Handle for changing the log filter at runtime.
pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Keeps the file writer alive; drop it last to flush pending records.
pub struct LogGuard {
    pub reload: ReloadHandle,
    _file: Option<WorkerGuard>,
}

/// Build the initial filter: `RUST_LOG` when set, else `level`.
pub fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
}

/// Initialize logging: human readable records on stderr and, when `dir` is
/// given, hourly rolling JSON files named `dhsbpp.log.*` inside it.
pub fn init(dir: Option<&Path>, level: Level) -> Result<LogGuard> {
    let (filter_layer, reload) = reload::Layer::new(filter(level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, file_guard) = match dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::HOURLY, dir, "dhsbpp.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .json()
                .with_current_span(false)
                .with_span_list(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(LogGuard { reload, _file: file_guard })
}

/// Replace the active filter with a new level.
pub fn set_level(handle: &ReloadHandle, level: Level) -> Result<()> {
    handle.reload(EnvFilter::default().add_directive(level.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_once_with_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init(Some(dir.path()), Level::DEBUG).unwrap();
        tracing::info!("hello");
        set_level(&guard.reload, Level::WARN).unwrap();
        // A second global subscriber is refused.
        assert!(init(None, Level::INFO).is_err());
    }
}
