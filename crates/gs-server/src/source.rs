//! Line-oriented JSON position source
//!
//! Reads one JSON object per line, e.g. from a GNSS daemon piped into
//! stdin. A line with `latitude`/`longitude` is a fix; a `satellites`
//! field updates the satellite count. Lines arriving while the source is
//! stopped are read and discarded so the producer never blocks.
//!
//! ```text
//! {"latitude":55.7512,"longitude":37.6184,"altitude":156.0,"accuracy":3.5}
//! {"satellites":11}
//! ```

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use gs_core::time::current_time_millis;
use gs_core::traits::{PositionEvent, PositionFix, PositionSink, PositionSource};
use gs_core::ServerError;

/// Provider name used when a line does not carry one
const DEFAULT_PROVIDER: &str = "gps";

#[derive(Debug, Deserialize)]
struct InputLine {
    latitude: Option<f64>,
    longitude: Option<f64>,
    timestamp: Option<u64>,
    altitude: Option<f64>,
    accuracy: Option<f32>,
    bearing: Option<f32>,
    speed: Option<f32>,
    vertical_accuracy: Option<f32>,
    bearing_accuracy: Option<f32>,
    speed_accuracy: Option<f32>,
    provider: Option<String>,
    satellites: Option<u32>,
}

/// Parse one input line into position events.
///
/// A missing timestamp means "now".
pub fn parse_line(line: &str, now_millis: u64) -> Result<Vec<PositionEvent>, serde_json::Error> {
    let input: InputLine = serde_json::from_str(line)?;
    let mut events = Vec::with_capacity(2);

    if let Some(count) = input.satellites {
        events.push(PositionEvent::Satellites(count));
    }

    if let (Some(latitude), Some(longitude)) = (input.latitude, input.longitude) {
        events.push(PositionEvent::Fix(PositionFix {
            timestamp: input.timestamp.unwrap_or(now_millis),
            latitude,
            longitude,
            altitude: input.altitude,
            accuracy: input.accuracy,
            bearing: input.bearing,
            speed: input.speed,
            vertical_accuracy: input.vertical_accuracy,
            bearing_accuracy: input.bearing_accuracy,
            speed_accuracy: input.speed_accuracy,
            provider: input
                .provider
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
        }));
    }

    Ok(events)
}

/// `PositionSource` over any buffered async reader
pub struct JsonLinesSource<R> {
    reader: Option<R>,
    sink: watch::Sender<Option<PositionSink>>,
    task: Option<JoinHandle<()>>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Wrap a reader. Nothing is read until the first `start`.
    pub fn new(reader: R) -> Self {
        let (sink, _) = watch::channel(None);
        Self {
            reader: Some(reader),
            sink,
            task: None,
        }
    }
}

impl<R> PositionSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn start(&mut self, sink: PositionSink) -> Result<(), ServerError> {
        if self.task.as_ref().is_some_and(|task| task.is_finished()) {
            return Err(ServerError::SourceStart("input closed".to_string()));
        }

        self.sink.send_replace(Some(sink));
        if let Some(reader) = self.reader.take() {
            self.task = Some(tokio::spawn(read_lines(reader, self.sink.subscribe())));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.send_replace(None);
    }
}

impl<R> Drop for JsonLinesSource<R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn read_lines<R>(reader: R, sink: watch::Receiver<Option<PositionSink>>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Position input closed");
                return;
            }
            Err(e) => {
                tracing::error!("Failed to read position input: {}", e);
                return;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let events = match parse_line(line, current_time_millis()) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Skipping malformed position line: {}", e);
                continue;
            }
        };

        let current = sink.borrow().clone();
        let Some(current) = current else {
            continue;
        };

        for event in events {
            if !current.send(event).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_fix() {
        let events = parse_line(
            r#"{"latitude":1.5,"longitude":-2.5,"timestamp":42,"speed":0.0}"#,
            1000,
        )
        .unwrap();

        match &events[..] {
            [PositionEvent::Fix(fix)] => {
                assert_eq!(fix.timestamp, 42);
                assert_eq!(fix.speed, Some(0.0));
                assert_eq!(fix.altitude, None);
                assert_eq!(fix.provider, "gps");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_parse_satellites_and_default_timestamp() {
        let events = parse_line(r#"{"satellites":8,"latitude":1,"longitude":2}"#, 777).unwrap();
        assert_eq!(events[0], PositionEvent::Satellites(8));
        assert!(matches!(&events[1], PositionEvent::Fix(fix) if fix.timestamp == 777));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line("not json", 0).is_err());
        assert!(parse_line(r#"{"latitude":"north"}"#, 0).is_err());
        assert!(parse_line(r#"{"latitude":1.0}"#, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_delivers_while_started() {
        let input = "{\"satellites\":5}\n\n# comment\nbad line\n{\"latitude\":1,\"longitude\":2}\n";
        let mut source = JsonLinesSource::new(BufReader::new(Cursor::new(input.as_bytes().to_vec())));
        let (tx, mut rx) = mpsc::channel(8);

        source.start(PositionSink::new(tx)).unwrap();

        assert_eq!(rx.recv().await, Some(PositionEvent::Satellites(5)));
        assert!(matches!(rx.recv().await, Some(PositionEvent::Fix(_))));

        // Input exhausted: the reader task ends and drops the sink
        source.stop();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stopped_source_discards_lines() {
        let (client, server) = tokio::io::duplex(256);
        let mut source = JsonLinesSource::new(BufReader::new(server));
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = client;

        source.start(PositionSink::new(tx.clone())).unwrap();
        source.stop();

        writer.write_all(b"{\"satellites\":1}\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        source.start(PositionSink::new(tx)).unwrap();
        writer.write_all(b"{\"satellites\":2}\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(PositionEvent::Satellites(2)));
    }
}
