//! Notification events and sinks.

use crate::error::{Error, Result};
use crate::store::{DetectionId, RegionId, ReportId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::info;

/// A detection entered a rule region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Matching detection.
    pub detection_id: DetectionId,
    /// Report of the detection.
    pub report_id: ReportId,
    /// Matched region.
    pub rule_region_id: RegionId,
    /// Detected class.
    pub class_label: String,
}

/// Transport for notification events.
///
/// Delivery is at-least-once; consumers must tolerate duplicates.
pub trait NotificationSink: Send + Sync {
    /// Deliver one event, failing with `Error::Delivery`.
    fn emit(&self, event: &NotificationEvent) -> Result<()>;
}

/// Forwards events to an in-process consumer over a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn emit(&self, event: &NotificationEvent) -> Result<()> {
        self.tx.send(event.clone()).map_err(|_| Error::Delivery {
            reason: "notification receiver dropped".to_string(),
        })
    }
}

/// Logs events at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn emit(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            detection = %event.detection_id,
            report = %event.report_id,
            region = %event.rule_region_id,
            class = %event.class_label,
            "rule region match"
        );
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create (truncate) the output file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationSink for JsonLinesSink {
    fn emit(&self, event: &NotificationEvent) -> Result<()> {
        let line = serde_json::to_string(event).map_err(|e| Error::JsonWrite {
            path: self.path.clone(),
            source: e,
        })?;
        let mut writer = self.writer.lock().map_err(|_| Error::Delivery {
            reason: "sink lock poisoned".to_string(),
        })?;
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| Error::Delivery {
                reason: format!("{}: {e}", self.path.display()),
            })
    }
}

/// Fans one event out to several sinks; fails if any sink fails.
pub struct MultiSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl MultiSink {
    /// Combine sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for MultiSink {
    fn emit(&self, event: &NotificationEvent) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Sends each event to the sink registered for its report.
///
/// Events of unregistered reports go to the fallback sink.
pub struct ReportRouter {
    routes: RwLock<HashMap<ReportId, Arc<dyn NotificationSink>>>,
    fallback: Arc<dyn NotificationSink>,
}

impl ReportRouter {
    /// Router with no routes yet.
    #[must_use]
    pub fn new(fallback: Arc<dyn NotificationSink>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            fallback,
        }
    }

    /// Route events of `report_id` to `sink`, replacing any previous route.
    pub fn route(&self, report_id: ReportId, sink: Arc<dyn NotificationSink>) -> Result<()> {
        self.routes
            .write()
            .map_err(|_| Error::Internal {
                message: "router lock poisoned".to_string(),
            })?
            .insert(report_id, sink);
        Ok(())
    }
}

impl NotificationSink for ReportRouter {
    fn emit(&self, event: &NotificationEvent) -> Result<()> {
        let sink = self
            .routes
            .read()
            .map_err(|_| Error::Delivery {
                reason: "router lock poisoned".to_string(),
            })?
            .get(&event.report_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        sink.emit(event)
    }
}
