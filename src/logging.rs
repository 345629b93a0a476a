//! Logger setup for the binaries: stderr plus `logs/<name>_<timestamp>.log`.

use anyhow::Result;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

const LOG_DIR: &str = "logs";

/// Writes every record to stderr and the log file.
struct Tee {
    file: BufWriter<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

pub fn log_file_path(name: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(LOG_DIR).join(format!("{}_{}.log", name, ts))
}

/// `RUST_LOG` overrides the default `info` filter.
pub fn init(name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(LOG_DIR)?;
    let path = log_file_path(name);
    let file = File::create(&path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(Tee {
            file: BufWriter::new(file),
        })))
        .try_init()?;

    Ok(path)
}
