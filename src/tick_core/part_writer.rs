//! Staged appends through a `.part` sibling file
//!
//! The batch is first appended to `<dest>.part`. If `dest` does not exist the
//! part file is renamed onto it; otherwise its bytes are copied onto the end
//! of `dest` and the part file is removed. A crash mid-batch leaves either an
//! untouched `dest` or a leftover `.part` that the next batch extends.

use crate::error::ExportError;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Append `lines` (each followed by a newline) to `dest`.
pub fn append_batch<I, S>(dest: &Path, lines: I) -> Result<usize, ExportError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let part = part_path(dest);
    let mut written = 0;
    {
        let file = OpenOptions::new().create(true).append(true).open(&part)?;
        let mut writer = BufWriter::with_capacity(1 << 16, file);
        for line in lines {
            writer.write_all(line.as_ref().as_bytes())?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;
    }

    if !dest.exists() {
        fs::rename(&part, dest)?;
    } else {
        let mut src = File::open(&part)?;
        let mut dst = OpenOptions::new().append(true).open(dest)?;
        io::copy(&mut src, &mut dst)?;
        dst.flush()?;
        fs::remove_file(&part)?;
    }

    Ok(written)
}
