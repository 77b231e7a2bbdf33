use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contracts::{now_millis, IngestError, Lifecycle, Record, Sink};
use tracing::info;

/// How record content is rendered into the payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// JSON-encoded string; non-UTF-8 bytes are replaced.
    Text,
    /// Base64, safe for arbitrary bytes.
    #[default]
    Binary,
}

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub name: String,
    /// Target path; a literal `$t` is replaced with the epoch milliseconds
    /// at the moment the file is opened.
    pub path: String,
    pub mode: PayloadMode,
}

impl FileSinkConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mode: PayloadMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: PayloadMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Appends one CSV-ish line per record:
/// `timestamp,"source","author",payload`.
pub struct FileSink {
    config: FileSinkConfig,
    writer: Mutex<Option<BufWriter<File>>>,
    resolved_path: Mutex<Option<PathBuf>>,
}

impl FileSink {
    pub fn new(config: FileSinkConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            resolved_path: Mutex::new(None),
        }
    }

    /// The concrete path in use, once enabled.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.resolved_path.lock().unwrap().clone()
    }

    fn render_line(&self, record: &Record) -> String {
        let payload = match self.config.mode {
            PayloadMode::Text => json_string(&String::from_utf8_lossy(&record.content)),
            PayloadMode::Binary => BASE64.encode(&record.content),
        };
        format!(
            "{},{},{},{}",
            record.timestamp,
            json_string(&record.source),
            json_string(&record.author),
            payload
        )
    }
}

/// JSON encoding keeps non-ASCII attribution readable in the output file,
/// unlike Rust's `Debug` escaping.
fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn take(&self, record: Record) -> Result<(), IngestError> {
        let line = self.render_line(&record);

        let mut writer = self.writer.lock().unwrap();
        let Some(writer) = writer.as_mut() else {
            return Err(IngestError::sink_write(
                &self.config.name,
                "sink is not enabled",
            ));
        };
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| IngestError::sink_write(&self.config.name, e.to_string()))
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }
}

#[async_trait]
impl Lifecycle for FileSink {
    fn is_enabled(&self) -> bool {
        self.writer.lock().unwrap().is_some()
    }

    async fn enable(&self) -> Result<(), IngestError> {
        let mut writer = self.writer.lock().unwrap();
        if writer.is_some() {
            return Ok(());
        }

        let path = self.config.path.replace("$t", &now_millis().to_string());
        let path = Path::new(&path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;

        info!(sink = %self.config.name, path = %path.display(), "file sink opened");
        *self.resolved_path.lock().unwrap() = Some(path.to_path_buf());
        *writer = Some(BufWriter::new(file));
        Ok(())
    }

    async fn disable(&self) -> Result<(), IngestError> {
        let mut writer = self.writer.lock().unwrap();
        if let Some(mut writer) = writer.take() {
            writer
                .flush()
                .map_err(|e| IngestError::sink_write(&self.config.name, e.to_string()))?;
        }
        Ok(())
    }
}
