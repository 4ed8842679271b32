use crate::types::AddressMap;
use anyhow::{Context, Result};
use std::io::Write;

/// Writes an address mapping as one JSON object.
pub struct AddressWriter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> AddressWriter<W> {
    /// Two-space indented output
    pub fn new(writer: W) -> Self {
        AddressWriter {
            writer,
            pretty: true,
        }
    }

    /// Single-line output
    pub fn compact(writer: W) -> Self {
        AddressWriter {
            writer,
            pretty: false,
        }
    }

    pub fn write_map(&mut self, addresses: &AddressMap) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(addresses)
        } else {
            serde_json::to_string(addresses)
        }
        .context("Failed to serialize address map")?;

        writeln!(self.writer, "{}", json).context("Failed to write address map")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
