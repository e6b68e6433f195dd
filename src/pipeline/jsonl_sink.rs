//! JSONL archive sink: an optional fanout consumer that appends every
//! classified batch as one JSON line, with size-based rotation.
//!
//! Archives pair with `JsonlReplaySource` for capture-and-replay debugging
//! of classification and storage behaviour.

use crate::pipeline::batch::ClassifiedBatch;
use crate::pipeline::fanout::BatchConsumer;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

pub struct JsonlSink {
    file: BufWriter<File>,
    current_size: u64,
    max_size: u64,
    base_path: PathBuf,
    rotation_count: u32,
    max_rotations: u32,
}

impl JsonlSink {
    pub fn new(
        path: impl AsRef<Path>,
        max_size_mb: u64,
        max_rotations: u32,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            file: BufWriter::new(file),
            current_size,
            max_size: max_size_mb * 1024 * 1024,
            base_path: path.to_path_buf(),
            rotation_count: 0,
            max_rotations,
        })
    }

    pub fn write_batch(&mut self, batch: &ClassifiedBatch) -> Result<(), SinkError> {
        let json = serde_json::to_string(batch)?;
        writeln!(self.file, "{}", json)?;
        self.file.flush()?;

        self.current_size += (json.len() + 1) as u64;

        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        Ok(())
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        self.file.flush()?;

        for i in (1..self.max_rotations).rev() {
            let old_path = self.base_path.with_extension(format!("jsonl.{}", i));
            let new_path = self.base_path.with_extension(format!("jsonl.{}", i + 1));

            if old_path.exists() {
                std::fs::rename(&old_path, &new_path)?;
            }
        }

        let rotated_path = self.base_path.with_extension("jsonl.1");
        if self.base_path.exists() {
            std::fs::rename(&self.base_path, &rotated_path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base_path)?;

        self.file = BufWriter::new(file);
        self.current_size = 0;
        self.rotation_count += 1;

        log::info!("📄 Rotated archive file (rotation #{})", self.rotation_count);

        Ok(())
    }
}

#[async_trait]
impl BatchConsumer for JsonlSink {
    fn name(&self) -> &str {
        "jsonl-archive"
    }

    async fn on_batch(
        &mut self,
        batch: Arc<ClassifiedBatch>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_batch(&batch)?;
        Ok(())
    }
}
