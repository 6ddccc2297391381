// src/logging.rs
//
// Timestamped diagnostic logging. Library code logs through `tlog!`, which
// stays silent unless stderr logging has been switched on or a log file is
// open.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::CodecResult;

/// Global log file handle. When `Some`, `tlog!` also writes to this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

static STDERR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Turn logging to stderr on or off.
pub fn set_enabled(enabled: bool) {
    STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    STDERR_ENABLED.load(Ordering::Relaxed)
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to the message, then writes it to
/// stderr (when enabled) and to the log file (when open).
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let to_stderr = $crate::logging::is_enabled();
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if to_stderr || guard.is_some() {
                let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
                if to_stderr {
                    eprintln!("{}", msg);
                }
                if let Some(ref mut f) = *guard {
                    let _ = writeln!(f, "{}", msg);
                }
            }
        }
    }};
}

/// Start logging to a timestamped file in `log_dir`.
/// Also maintains a `canbits.log` symlink to the newest file (Unix only).
pub fn init_file_logging(log_dir: &Path) -> CodecResult<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-canbits.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("canbits.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create canbits.log symlink: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    tlog!("[logging] File logging started: {}", log_path.display());

    Ok(log_path)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.take().is_some() && is_enabled() {
            eprintln!(
                "{} [logging] File logging stopped",
                chrono::Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}
