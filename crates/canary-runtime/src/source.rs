use canary_protocol::{CanaryError, CanaryResult};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, instrument};

use crate::rooms::RoomRegistry;
use crate::{IngestSenders, RawLine, TransportError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub frames: u64,
    pub lines: u64,
    pub transport_errors: u64,
}

/// Splits a framed protocol stream into ingest events.
///
/// A frame may open with `>room`, which scopes the lines after it to that
/// room; a blank line closes the frame and returns to the global room.
/// `|init|` and `|deinit` lines keep the [`RoomRegistry`] current.
pub struct FrameSource<R> {
    reader: R,
    rooms: RoomRegistry,
    senders: IngestSenders,
    room: String,
    stats: SourceStats,
}

impl<R> FrameSource<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, rooms: RoomRegistry, senders: IngestSenders) -> Self {
        Self {
            reader,
            rooms,
            senders,
            room: String::new(),
            stats: SourceStats::default(),
        }
    }

    /// Read until end of stream or until the ingestor hangs up.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> CanaryResult<SourceStats> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut buffer)
                .await
                .map_err(|error| CanaryError::Io(format!("failed reading frames: {error}")))?;
            if read == 0 {
                break;
            }
            if !self.handle_line(trim_line_ending(&buffer)).await {
                debug!("ingestor closed; stopping frame source");
                break;
            }
        }

        info!(
            frames = self.stats.frames,
            lines = self.stats.lines,
            transport_errors = self.stats.transport_errors,
            "frame source finished"
        );
        Ok(self.stats)
    }

    /// Returns false once the ingestor is gone.
    async fn handle_line(&mut self, bytes: &[u8]) -> bool {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(error) => {
                self.stats.transport_errors += 1;
                let event = TransportError {
                    room: self.room.clone(),
                    raw: String::from_utf8_lossy(bytes).into_owned(),
                    errors: vec![format!("invalid utf-8 in protocol line: {error}")],
                };
                return self.senders.errors.send(event).await.is_ok();
            }
        };

        if text.is_empty() {
            self.room.clear();
            return true;
        }
        if let Some(room) = text.strip_prefix('>') {
            self.stats.frames += 1;
            self.room = room.to_owned();
            return true;
        }

        // Global lines never open or close a room.
        if !self.room.is_empty() {
            if text.starts_with("|init|") {
                self.rooms.join(&self.room);
            } else if text == "|deinit" || text.starts_with("|deinit|") {
                self.rooms.leave(&self.room);
            }
        }

        self.stats.lines += 1;
        let event = RawLine {
            room: self.room.clone(),
            raw: text.to_owned(),
        };
        self.senders.lines.send(event).await.is_ok()
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
