//! Per-launch log file for SegmentFE.
//!
//! The log sits next to the settings file (`segmentfe.log` in the same config
//! folder) and starts empty on every launch.  Provider requests, renderer
//! state changes and export results all end up here, plus any panic.
//!
//! Library code logs through `log_info!`, `log_warn!` and `log_err!`.  Until
//! the binary calls `init()` nothing is written, which keeps tests and the
//! CLI quiet.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::settings::AppSettings;

const LOG_FILE_NAME: &str = "segmentfe.log";

static SINK: OnceLock<Mutex<File>> = OnceLock::new();

/// Append one `[time] [LEVEL] message` line.  I/O errors are dropped.
pub fn write(level: &str, msg: &str) {
    append(&format!("[{}] [{}] {}", clock(), level, msg));
}

fn append(line: &str) {
    let Some(sink) = SINK.get() else { return };
    if let Ok(mut file) = sink.lock() {
        let _ = writeln!(file, "{}", line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*))
    };
}

/// Where the log goes: beside the settings file, or the working directory
/// when no config folder can be resolved.
pub fn log_file_path() -> PathBuf {
    AppSettings::settings_path()
        .and_then(|p| p.parent().map(|d| d.join(LOG_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME))
}

/// Open (truncating) the log file and hook panics into it.  Returns the log
/// path, or `None` if the file could not be created.  Calling it twice keeps
/// the first file.
pub fn init() -> Option<PathBuf> {
    let path = log_file_path();
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot create {}: {}", path.display(), e);
            return None;
        }
    };
    if SINK.set(Mutex::new(file)).is_err() {
        return Some(path);
    }

    append(&format!("SegmentFE {} log, unix time {}", env!("CARGO_PKG_VERSION"), unix_secs()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        append(&format!("[{}] [PANIC] {}", clock(), info));
        previous(info);
    }));
    Some(path)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall clock as `HH:MM:SS`.
fn clock() -> String {
    let secs = unix_secs() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_hh_mm_ss() {
        let ts = clock();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[5], b':');
    }

    #[test]
    fn log_file_sits_beside_settings() {
        let path = log_file_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(LOG_FILE_NAME));
    }

    #[test]
    fn macros_work_as_statements_and_match_arms() {
        // No sink is installed in unit tests; none of this may panic.
        crate::log_info!("layer {} toggled", 3);
        let outcome: Result<u8, &str> = Err("unreadable");
        let value = match outcome {
            Ok(v) => v,
            Err(e) => {
                crate::log_warn!("skipping mask: {}", e);
                0
            }
        };
        assert_eq!(value, 0);
        let results: Vec<Result<(), &str>> = vec![Ok(()), Err("device lost")];
        for r in results {
            match r {
                Ok(()) => {}
                Err(e) => crate::log_err!("renderer: {}", e),
            }
        }
    }
}
