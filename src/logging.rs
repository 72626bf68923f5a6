//! env_logger setup with an optional append-only file mirror
//!
//! Lines go to stderr and, when enabled, to
//! `<output_root>/_logs/exporter_<YYYYMMDD>.log`.

use crate::config::RuntimeConfig;
use chrono::{SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub fn log_file_path(output_root: &Path) -> PathBuf {
    output_root
        .join("_logs")
        .join(format!("exporter_{}.log", Utc::now().format("%Y%m%d")))
}

/// Writes every line to stderr and, best-effort, to the log file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            if file.write_all(buf).is_err() {
                // Stop mirroring rather than failing every log call.
                self.file = None;
            }
        }
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        io::stderr().flush()
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global logger. Returns the mirror file path when one is open.
///
/// Safe to call more than once; later calls leave the first logger in place.
pub fn init(config: &RuntimeConfig, output_root: &Path) -> Option<PathBuf> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.rust_log);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level(),
            record.target(),
            record.args()
        )
    });

    let mut mirrored = None;
    let file = if config.log_to_file {
        let path = log_file_path(output_root);
        match open_log_file(&path) {
            Ok(file) => {
                mirrored = Some(path);
                Some(file)
            }
            Err(e) => {
                eprintln!("Could not open log file {}: {}", path.display(), e);
                None
            }
        }
    } else {
        None
    };

    builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    if builder.try_init().is_err() {
        return None;
    }

    if let Some(path) = &mirrored {
        log::info!("📝 Mirroring logs to: {}", path.display());
    }
    mirrored
}
