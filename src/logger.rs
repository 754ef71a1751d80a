use std::{io, path::Path, sync::OnceLock};
use tracing_subscriber::{EnvFilter, fmt};

static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
static INIT: OnceLock<()> = OnceLock::new();

fn env_filter(filter: &str) -> EnvFilter {
    // RUST_LOG="perft_hunt::hunt=debug" wins over the argument.
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging once for the whole process.
/// - `path`: e.g. `logs/hunt.log`; `None` logs to stderr
/// - `filter`: e.g. `perft_hunt=debug`
pub fn init_logging(path: Option<&Path>, filter: &str) -> io::Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    match path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            // Keep the guard alive for the program lifetime
            let _ = GUARD.set(guard);

            let subscriber = fmt()
                .with_env_filter(env_filter(filter))
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking)
                .finish();
            // Ignore error if someone already set a global subscriber
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        None => {
            let subscriber = fmt()
                .with_env_filter(env_filter(filter))
                .with_target(true)
                .with_writer(io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }

    let _ = INIT.set(());
    Ok(())
}
