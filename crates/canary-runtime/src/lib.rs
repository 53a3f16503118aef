//! Live ingestion and offline repair for the codec canary.
//!
//! The network side hands lines over two bounded channels; [`Ingestor`]
//! drains them one event at a time, classifies each line against the codec
//! and files the outcome in the [`CategorizedStore`]. [`reclassify`] reruns
//! every stored line against the current codec.

mod codec;
mod reclassify;
mod rooms;
mod source;

use std::sync::Arc;

use canary_classifier::{classify, transport_failure};
use canary_protocol::{Codec, Finding, RawObservation};
use canary_store::CategorizedStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

pub use codec::{ProcessCodec, ProcessCodecConfig};
pub use reclassify::{ReclassifyReport, reclassify, reclassify_document};
pub use rooms::RoomRegistry;
pub use source::{FrameSource, SourceStats};

/// One protocol line received in `room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub room: String,
    pub raw: String,
}

/// A line the transport could not deliver intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub room: String,
    pub raw: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestSenders {
    pub lines: mpsc::Sender<RawLine>,
    pub errors: mpsc::Sender<TransportError>,
}

#[derive(Debug)]
pub struct IngestReceivers {
    pub lines: mpsc::Receiver<RawLine>,
    pub errors: mpsc::Receiver<TransportError>,
}

pub fn ingest_channels(capacity: usize) -> (IngestSenders, IngestReceivers) {
    let capacity = capacity.max(1);
    let (lines_tx, lines_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);
    (
        IngestSenders {
            lines: lines_tx,
            errors: errors_tx,
        },
        IngestReceivers {
            lines: lines_rx,
            errors: errors_rx,
        },
    )
}

/// Wall-clock timestamps that never step backwards within one run.
#[derive(Debug, Clone, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn now(&mut self) -> DateTime<Utc> {
        self.stamp(Utc::now())
    }

    pub fn stamp(&mut self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let stamped = match self.last {
            Some(last) if last > wall => last,
            _ => wall,
        };
        self.last = Some(stamped);
        stamped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub lines: u64,
    pub transport_errors: u64,
    pub findings: u64,
    pub dropped: u64,
}

/// Single consumer of the ingest channels.
pub struct Ingestor {
    store: Arc<CategorizedStore>,
    codec: Arc<dyn Codec>,
    clock: MonotonicClock,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(store: Arc<CategorizedStore>, codec: Arc<dyn Codec>) -> Self {
        Self {
            store,
            codec,
            clock: MonotonicClock::default(),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Classify one line and record it. A codec that cannot be reached
    /// still counts the line as seen; only the finding is lost.
    #[instrument(skip(self, line), fields(room = %line.room))]
    pub async fn ingest_line(&mut self, line: RawLine) {
        self.stats.lines += 1;
        let observation = RawObservation::new(self.clock.now(), line.room, line.raw);

        match classify(self.codec.as_ref(), observation).await {
            Ok(outcome) => self.record(outcome),
            Err(error) => {
                self.stats.dropped += 1;
                warn!(%error, "codec unavailable; line counted but not classified");
                self.store.record_seen();
            }
        }
    }

    #[instrument(skip(self, error), fields(room = %error.room, errors = error.errors.len()))]
    pub async fn ingest_transport_error(&mut self, error: TransportError) {
        self.stats.transport_errors += 1;
        let observation = RawObservation::new(self.clock.now(), error.room, error.raw);
        self.record(Some(transport_failure(observation, error.errors)));
    }

    fn record(&mut self, outcome: Option<Finding>) {
        match &outcome {
            Some(finding) => {
                self.stats.findings += 1;
                debug!(category = %finding.category(), "finding recorded");
            }
            None => debug!("round trip clean"),
        }
        self.store.observe(outcome);
    }

    async fn drain(&mut self, receivers: &mut IngestReceivers) {
        let backlog = receivers.lines.len() + receivers.errors.len();
        if backlog > 0 {
            debug!(backlog, "draining buffered ingest events");
        }
        while let Ok(line) = receivers.lines.try_recv() {
            self.ingest_line(line).await;
        }
        while let Ok(error) = receivers.errors.try_recv() {
            self.ingest_transport_error(error).await;
        }
    }

    /// Consume both channels until they close or `shutdown` turns true.
    /// Events already buffered when shutdown arrives are still recorded.
    pub async fn run(
        mut self,
        mut receivers: IngestReceivers,
        mut shutdown: watch::Receiver<bool>,
    ) -> IngestStats {
        let mut lines_open = true;
        let mut errors_open = true;

        info!("ingestion started");
        while lines_open || errors_open {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.drain(&mut receivers).await;
                        break;
                    }
                }
                line = receivers.lines.recv(), if lines_open => match line {
                    Some(line) => self.ingest_line(line).await,
                    None => lines_open = false,
                },
                error = receivers.errors.recv(), if errors_open => match error {
                    Some(error) => self.ingest_transport_error(error).await,
                    None => errors_open = false,
                },
            }
        }

        info!(
            lines = self.stats.lines,
            transport_errors = self.stats.transport_errors,
            findings = self.stats.findings,
            dropped = self.stats.dropped,
            "ingestion stopped"
        );
        self.stats
    }
}
