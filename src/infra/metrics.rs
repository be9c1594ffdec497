//! Metrics file
//!
//! Appends one CSV line per phase event:
//!
//! ```text
//! <unix-millis>,kiln,<phase>,<start|done>
//! ```
//!
//! Lines are handed to a background task over an unbounded channel, so
//! emitting never waits on the disk. Write failures are logged and dropped.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::events::{EventSink, PhaseEvent};

/// Source column of every metrics line
const METRICS_SOURCE: &str = "kiln";

/// Event sink feeding the metrics writer
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<String>,
}

/// Background task appending lines to the metrics file
#[derive(Debug)]
pub struct MetricsWriter {
    handle: JoinHandle<()>,
}

/// Open (or create) the metrics file for appending
///
/// Must be called from within a tokio runtime. The writer drains once every
/// clone of the sink has been dropped.
pub async fn open(path: &Path) -> io::Result<(MetricsSink, MetricsWriter)> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let shown = path.display().to_string();
    let handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = file.write_all(line.as_bytes()).await {
                tracing::warn!("Failed to write metrics to {shown}: {e}");
            }
        }
        if let Err(e) = file.flush().await {
            tracing::warn!("Failed to flush metrics to {shown}: {e}");
        }
    });

    Ok((MetricsSink { tx }, MetricsWriter { handle }))
}

/// Format an event as a metrics line, newline included
pub fn format_line(event: &PhaseEvent) -> String {
    let millis = event
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!(
        "{millis},{METRICS_SOURCE},{},{}\n",
        event.phase_name(),
        event.boundary.as_str()
    )
}

impl EventSink for MetricsSink {
    fn emit(&self, event: PhaseEvent) {
        // A closed channel only means the writer is gone.
        let _ = self.tx.send(format_line(&event));
    }
}

impl MetricsWriter {
    /// Wait until every queued line has been written
    ///
    /// Every [`MetricsSink`] clone must be dropped first, otherwise this waits
    /// forever.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Metrics writer stopped abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{Boundary, PHASE_COMPILE, PHASE_RUN};
    use crate::core::model::QualifiedName;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_format_line() {
        let event = PhaseEvent {
            phase: PHASE_RUN,
            package: Some(QualifiedName {
                release: "tor".into(),
                package: "tor".into(),
            }),
            boundary: Boundary::Done,
            timestamp: UNIX_EPOCH + Duration::from_millis(1_500),
        };
        assert_eq!(
            format_line(&event),
            "1500,kiln,compile-packages::run::tor/tor,done\n"
        );
    }

    #[tokio::test]
    async fn test_lines_are_appended_in_order() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("metrics/compile.csv");

        let (sink, writer) = open(&path).await.unwrap();
        sink.emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Start));
        sink.emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Done));
        drop(sink);
        writer.finish().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",kiln,compile-packages,start"));
        assert!(lines[1].ends_with(",kiln,compile-packages,done"));
    }

    #[tokio::test]
    async fn test_later_runs_append_to_the_same_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("compile.csv");

        for _ in 0..2 {
            let (sink, writer) = open(&path).await.unwrap();
            sink.emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Start));
            drop(sink);
            writer.finish().await;
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_emit_after_writer_is_gone_does_not_panic() {
        let temp = tempfile::TempDir::new().unwrap();
        let (sink, writer) = open(&temp.path().join("m.csv")).await.unwrap();
        writer.handle.abort();
        let _ = writer.handle.await;
        sink.emit(PhaseEvent {
            phase: PHASE_COMPILE,
            package: None,
            boundary: Boundary::Start,
            timestamp: SystemTime::now(),
        });
    }
}
