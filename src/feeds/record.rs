use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Appends every raw stream line to a file so it can be replayed later.
pub struct Recorder {
    file: File,
}

impl Recorder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening record file {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn record(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(['\r', '\n']);
        writeln!(self.file, "{line}").context("writing record file")?;
        self.file.flush().context("flushing record file")?;
        Ok(())
    }
}
