//! # Log sink
//!
//! Append-only write of every inbound line to `irc_server.log`, one writer
//! serializing access so concurrent connections never interleave mid-line.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

pub struct LogSink {
    file: Mutex<std::fs::File>,
}

impl LogSink {
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append `[<unix-ts>] <line>\n`. Failures are caught and returned as
    /// `Error::Log`, never panicking the caller — the caller logs and
    /// discards per the LogError propagation policy.
    pub fn append(&self, line: &str) -> Result<()> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut file = self.file.lock().unwrap();
        writeln!(file, "[{}] {}", ts, line).map_err(|e| Error::Log(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn appends_timestamped_line() {
        let path = std::env::temp_dir().join(format!(
            "wirechat-logsink-test-{}.log",
            std::process::id()
        ));
        let path_str = path.to_str().unwrap();
        let sink = LogSink::open(path_str).unwrap();
        sink.append("NICK bob").unwrap();
        sink.append("MSG hi").unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("NICK bob"));
        assert!(contents.contains("MSG hi"));
        assert_eq!(contents.lines().count(), 2);

        std::fs::remove_file(&path).ok();
    }
}
