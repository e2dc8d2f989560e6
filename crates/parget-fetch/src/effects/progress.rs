//! Progress aggregation for concurrent range workers.
//!
//! Workers never touch shared progress state. Each one holds a
//! [`RangeReporter`] that pushes events into an unbounded channel; a single
//! consumer task applies them in arrival order and forwards them to the
//! caller's [`ProgressSink`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::ByteRange;
use crate::data::progress::percent_of;
use crate::data::{ProgressSnapshot, RangeProgress};

/// Receiver of per-range progress, typically a terminal UI.
///
/// Calls arrive from one task, in order, with non-decreasing byte counts per
/// range.
pub trait ProgressSink: Send + 'static {
    fn set_total(&mut self, range_index: u32, total_bytes: u64);

    fn set_progress(&mut self, range_index: u32, bytes_written: u64);

    fn finish(&mut self, range_index: u32);

    fn fail(&mut self, _range_index: u32) {}
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn set_total(&mut self, _: u32, _: u64) {}

    fn set_progress(&mut self, _: u32, _: u64) {}

    fn finish(&mut self, _: u32) {}
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Total { index: u32, total: u64 },
    Progress { index: u32, bytes: u64, total: Option<u64> },
    Finished { index: u32 },
    Failed { index: u32 },
    Seal,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkCall {
    SetTotal(u32, u64),
    SetProgress(u32, u64),
    Finish(u32),
    Fail(u32),
}

impl SinkCall {
    fn deliver(self, sink: &mut dyn ProgressSink) {
        match self {
            SinkCall::SetTotal(i, total) => sink.set_total(i, total),
            SinkCall::SetProgress(i, bytes) => sink.set_progress(i, bytes),
            SinkCall::Finish(i) => sink.finish(i),
            SinkCall::Fail(i) => sink.fail(i),
        }
    }
}

type SharedState = Arc<Mutex<Vec<RangeProgress>>>;

fn lock(state: &SharedState) -> MutexGuard<'_, Vec<RangeProgress>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects progress from every worker of one run.
///
/// Must be started inside a tokio runtime.
#[derive(Debug)]
pub struct ProgressAggregator {
    tx: mpsc::UnboundedSender<Event>,
    state: SharedState,
    consumer: JoinHandle<()>,
}

impl ProgressAggregator {
    /// Spawn the consumer task for `ranges`, forwarding to `sink`.
    pub fn start(ranges: &[ByteRange], sink: Box<dyn ProgressSink>) -> Self {
        let state: SharedState = Arc::new(Mutex::new(
            ranges
                .iter()
                .map(|r| RangeProgress::new(r.index, r.len()))
                .collect(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume(rx, Arc::clone(&state), sink));

        Self {
            tx,
            state,
            consumer,
        }
    }

    /// Handle for the worker that owns `range`.
    pub fn reporter(&self, range: &ByteRange) -> RangeReporter {
        RangeReporter {
            index: range.index,
            expected: range.len(),
            last_percent: None,
            tx: self.tx.clone(),
        }
    }

    /// Record that range `range_index` has `bytes_written` of
    /// `total_expected` bytes on disk. Stale or duplicate reports are ignored.
    pub fn report(&self, range_index: u32, bytes_written: u64, total_expected: u64) {
        let _ = self.tx.send(Event::Progress {
            index: range_index,
            bytes: bytes_written,
            total: Some(total_expected),
        });
    }

    /// Stop accepting progress. Only failure events are applied afterwards.
    pub fn seal(&self) {
        let _ = self.tx.send(Event::Seal);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            ranges: lock(&self.state).clone(),
        }
    }

    /// Apply every pending event, stop the consumer and return the final state.
    pub async fn close(self) -> ProgressSnapshot {
        let _ = self.tx.send(Event::Close);
        if let Err(e) = self.consumer.await {
            warn!(error = %e, "progress consumer terminated abnormally");
        }
        ProgressSnapshot {
            ranges: lock(&self.state).clone(),
        }
    }
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<Event>,
    state: SharedState,
    mut sink: Box<dyn ProgressSink>,
) {
    let mut sealed = false;
    let mut sink_alive = true;

    while let Some(event) = rx.recv().await {
        let calls = match event {
            Event::Close => break,
            Event::Seal => {
                sealed = true;
                continue;
            }
            event => apply(&mut lock(&state), event, sealed),
        };

        if !sink_alive {
            continue;
        }
        for call in calls {
            if catch_unwind(AssertUnwindSafe(|| call.deliver(sink.as_mut()))).is_err() {
                warn!("progress sink panicked, disabling progress output");
                sink_alive = false;
                break;
            }
        }
    }
}

fn apply(ranges: &mut [RangeProgress], event: Event, sealed: bool) -> Vec<SinkCall> {
    let index = match event {
        Event::Total { index, .. }
        | Event::Progress { index, .. }
        | Event::Finished { index }
        | Event::Failed { index } => index,
        Event::Seal | Event::Close => return Vec::new(),
    };
    let Some(range) = ranges.iter_mut().find(|r| r.range_index == index) else {
        return Vec::new();
    };

    let mut calls = Vec::new();
    match event {
        Event::Failed { .. } => {
            if !range.is_terminal() {
                range.failed = true;
                calls.push(SinkCall::Fail(index));
            }
        }
        _ if sealed || range.is_terminal() => {}
        Event::Total { total, .. } => {
            range.expected_bytes = total;
            calls.push(SinkCall::SetTotal(index, total));
        }
        Event::Progress { bytes, total, .. } => {
            if let Some(total) = total.filter(|t| *t != range.expected_bytes) {
                range.expected_bytes = total;
                calls.push(SinkCall::SetTotal(index, total));
            }
            if bytes > range.bytes_written {
                range.bytes_written = bytes;
                calls.push(SinkCall::SetProgress(index, bytes));
            }
        }
        Event::Finished { .. } => {
            range.done = true;
            calls.push(SinkCall::Finish(index));
        }
        Event::Seal | Event::Close => {}
    }
    calls
}

/// A worker's handle into the aggregator.
///
/// Keeps the last percentage it sent and only forwards a new byte count when
/// the integer percentage changes.
#[derive(Debug)]
pub struct RangeReporter {
    index: u32,
    expected: u64,
    last_percent: Option<u8>,
    tx: mpsc::UnboundedSender<Event>,
}

impl RangeReporter {
    pub fn set_total(&mut self, total_bytes: u64) {
        self.expected = total_bytes;
        self.send(Event::Total {
            index: self.index,
            total: total_bytes,
        });
    }

    pub fn advance(&mut self, bytes_written: u64) {
        let percent = percent_of(bytes_written, self.expected, false);
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        self.send(Event::Progress {
            index: self.index,
            bytes: bytes_written,
            total: None,
        });
    }

    pub fn finish(&mut self) {
        self.send(Event::Progress {
            index: self.index,
            bytes: self.expected,
            total: None,
        });
        self.send(Event::Finished { index: self.index });
    }

    pub fn fail(&mut self) {
        self.send(Event::Failed { index: self.index });
    }

    fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
