use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use std::io::IsTerminal;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

const CHROME_ENV: &str = "SPIRAL_TRACE_CHROME";

/// Options resolved before the subscriber is installed.
#[derive(Clone, Debug)]
pub struct TraceOptions {
    /// Directive used when `RUST_LOG` is absent or malformed.
    pub default_directive: String,
    /// Destination of the Chrome trace file, if any.
    pub chrome_path: Option<PathBuf>,
    pub ansi: bool,
}

impl TraceOptions {
    /// Reads `SPIRAL_TRACE_CHROME` and probes stderr for colour support.
    pub fn from_env(default_directive: &str) -> Result<Self, InitError> {
        Ok(Self {
            default_directive: default_directive.to_string(),
            chrome_path: chrome_trace_path()?,
            ansi: std::io::stderr().is_terminal(),
        })
    }
}

/// Configures the global tracing subscriber with an `info` default.
pub fn init_tracing() -> Result<(), InitError> {
    init_tracing_with(TraceOptions::from_env("info")?)
}

/// Configures the global tracing subscriber from explicit options.
///
/// Logs go to stderr so that command output on stdout stays machine readable.
pub fn init_tracing_with(options: TraceOptions) -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_directive));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(options.ansi)
        .with_writer(std::io::stderr);

    let chrome_layer = options.chrome_path.map(|path| {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file(path)
            .include_args(true)
            .build();
        let cell = CHROME_GUARD.get_or_init(|| Mutex::new(None));
        if let Ok(mut slot) = cell.lock() {
            *slot = Some(guard);
        }
        layer
    });

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .init();
    Ok(())
}

/// Flushes and drops the Chrome trace writer so the file is complete.
pub fn flush_chrome_trace() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(CHROME_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw))),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read {CHROME_ENV}: {0}")]
    Env(std::env::VarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_default_directive() {
        let options = TraceOptions::from_env("debug").unwrap();
        assert_eq!(options.default_directive, "debug");
    }
}
