//! Append-only JSONL output of rendered payloads.

use crate::payload::PayloadTemplate;
use engine_core::sink::{PublishError, ReadingSink};
use engine_core::Reading;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes one rendered payload per line. The file is opened in append
/// mode so earlier runs are preserved.
pub struct JsonlSink {
    path: PathBuf,
    template: PayloadTemplate,
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn new(path: &Path, template: PayloadTemplate) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            template,
            writer: BufWriter::with_capacity(8192, file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadingSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        let line = self.template.render_line(reading)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
