//! Log sinks of a run.
//!
//! Every message goes to `output_log.txt` in the output directory. Stdout
//! gets the same messages unless the run is silent. The level comes from
//! `RUST_LOG` and defaults to `info`.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub const LOG_FILE: &str = "output_log.txt";

/// Open the log file of `dir` for appending, creating the directory and
/// the file when missing.
pub fn open_log_file(dir: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
}

/// Subscriber writing to stdout unless `silent` and to `file` when given.
pub fn subscriber(silent: bool, file: Option<File>) -> impl Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = (!silent).then(|| fmt::layer().with_target(false));
    let file = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
}
