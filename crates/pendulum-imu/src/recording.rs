//! Recorded sensor feed.
//!
//! One event per line: `kind,timestamp_ns,x,y,z` where `kind` is `accel`,
//! `mag` or `gyro`. Blank lines and lines starting with `#` are ignored.

use crate::types::{SensorEvent, SensorKind};
use crate::SensorSink;
use anyhow::Result;
use glam::Vec3;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Debug, Error, PartialEq)]
pub enum RecordingError {
    #[error("Expected 5 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("Unknown sensor kind `{0}`")]
    UnknownKind(String),
    #[error("Invalid timestamp `{0}`")]
    InvalidTimestamp(String),
    #[error("Invalid axis value `{0}`")]
    InvalidValue(String),
    #[error("Pending line of {0} bytes exceeds the line length limit, discarded")]
    LineTooLong(usize),
}

/// Longest pending line kept while waiting for its newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Streaming parser for recorded sensor lines.
///
/// Feed raw bytes via `push_data`, then drain parsed events via `next_event`.
pub struct RecordingParser {
    buffer: VecDeque<u8>,
    /// Dropping the rest of an overlong line up to its newline.
    discarding: bool,
}

impl RecordingParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(8192),
            discarding: false,
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Try to extract the next complete event from the buffer.
    /// Returns `None` if no complete line is available yet.
    pub fn next_event(&mut self) -> Option<Result<SensorEvent, RecordingError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                return self.check_pending_len();
            };
            if self.discarding {
                self.buffer.drain(..=end);
                self.discarding = false;
                continue;
            }
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Some(parse_line(line));
        }
    }

    /// Parse whatever is left in the buffer as a final, unterminated line.
    pub fn finish(&mut self) -> Option<Result<SensorEvent, RecordingError>> {
        if !self.buffer.is_empty() {
            self.buffer.push_back(b'\n');
        }
        self.next_event()
    }

    fn check_pending_len(&mut self) -> Option<Result<SensorEvent, RecordingError>> {
        if self.discarding {
            self.buffer.clear();
            return None;
        }
        if self.buffer.len() <= MAX_LINE_LEN {
            return None;
        }
        let pending = self.buffer.len();
        self.buffer.clear();
        self.discarding = true;
        Some(Err(RecordingError::LineTooLong(pending)))
    }
}

impl Default for RecordingParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(line: &str) -> Result<SensorEvent, RecordingError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(RecordingError::FieldCount(fields.len()));
    }

    let kind = match fields[0] {
        "accel" => SensorKind::Accelerometer,
        "mag" => SensorKind::Magnetometer,
        "gyro" => SensorKind::Gyroscope,
        other => return Err(RecordingError::UnknownKind(other.to_string())),
    };

    let timestamp_ns = fields[1]
        .parse::<i64>()
        .map_err(|_| RecordingError::InvalidTimestamp(fields[1].to_string()))?;

    let axis = |s: &str| -> Result<f32, RecordingError> {
        s.parse::<f32>()
            .map_err(|_| RecordingError::InvalidValue(s.to_string()))
    };

    Ok(SensorEvent {
        kind,
        timestamp_ns,
        values: Vec3::new(axis(fields[2])?, axis(fields[3])?, axis(fields[4])?),
    })
}

/// Render an event as one recording line (newline included).
pub fn format_event(event: &SensorEvent) -> String {
    let kind = match event.kind {
        SensorKind::Accelerometer => "accel",
        SensorKind::Magnetometer => "mag",
        SensorKind::Gyroscope => "gyro",
    };
    format!(
        "{kind},{},{},{},{}\n",
        event.timestamp_ns, event.values.x, event.values.y, event.values.z
    )
}

/// Holds each event back until its recorded offset from the first event has elapsed.
struct Pacer {
    started: tokio::time::Instant,
    origin_ns: Option<i64>,
}

impl Pacer {
    fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
            origin_ns: None,
        }
    }

    async fn wait_for(&mut self, event: &SensorEvent) {
        let origin = *self.origin_ns.get_or_insert(event.timestamp_ns);
        let offset = (event.timestamp_ns - origin).max(0) as u64;
        tokio::time::sleep_until(self.started + Duration::from_nanos(offset)).await;
    }
}

/// Read a recording file and forward its events to `sink`.
///
/// With `realtime` set, events are paced by their recorded timestamps.
/// Returns the number of events forwarded.
pub async fn replay(path: &Path, sink: SensorSink, realtime: bool) -> Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    tracing::info!(?path, realtime, "Replaying sensor recording");

    let mut parser = RecordingParser::new();
    let mut buf = [0u8; 4096];
    let mut forwarded: u64 = 0;
    let mut pacer = realtime.then(Pacer::new);

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        parser.push_data(&buf[..n]);

        while let Some(result) = parser.next_event() {
            match result {
                Ok(event) => {
                    if let Some(pacer) = &mut pacer {
                        pacer.wait_for(&event).await;
                    }
                    if !sink.send(event) {
                        tracing::warn!("Sensor hub closed, replay aborted");
                        return Ok(forwarded);
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    tracing::trace!(?e, "Skipping malformed recording line");
                }
            }
        }
    }

    match parser.finish() {
        Some(Ok(event)) => {
            if let Some(pacer) = &mut pacer {
                pacer.wait_for(&event).await;
            }
            if sink.send(event) {
                forwarded += 1;
            }
        }
        Some(Err(e)) => tracing::trace!(?e, "Skipping malformed final recording line"),
        None => {}
    }

    tracing::info!(forwarded, "Recording replay finished");
    Ok(forwarded)
}
