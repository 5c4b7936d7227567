//! Packet event source: newline-delimited JSON `PacketEvent` records.

use sonic_dtel::PacketEvent;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

use crate::error::Result;

/// Reads events line by line, skipping blank and malformed lines.
pub struct EventReader<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines that did not parse as an event.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next event, or `None` at end of input.
    pub async fn next_event(&mut self) -> Result<Option<PacketEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, "Skipping malformed event: {}", e);
                }
            }
        }
        Ok(None)
    }
}

/// Boxed reader over a file or stdin.
pub type DynEventReader = EventReader<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Opens `path`, or stdin when `None`.
pub async fn open(path: Option<&Path>) -> Result<DynEventReader> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match path {
        Some(path) => {
            info!("Reading packet events from {}", path.display());
            Box::new(BufReader::new(File::open(path).await?))
        }
        None => {
            info!("Reading packet events from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };
    Ok(EventReader::new(reader))
}
