use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Open an event source: `-` is stdin, anything else a recorded file.
pub fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file =
        File::open(path).with_context(|| format!("opening playback file {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Newline-delimited events from `reader`, with blank lines dropped.
/// Read errors end the stream after being logged.
pub fn lines(reader: impl BufRead) -> impl Iterator<Item = String> {
    reader
        .lines()
        .map_while(|line| match line {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!("event source read failed: {e}");
                None
            }
        })
        .filter(|line| !line.trim().is_empty())
}
