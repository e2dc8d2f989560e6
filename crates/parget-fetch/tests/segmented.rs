//! End-to-end runs of the segmented fetcher against an in-memory server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use parget_fetch::{
    Error, FetchOptions, FetchState, HttpClient, OverwritePolicy, ProbeMethod, ProgressSink,
    RangeUnitPolicy, Response, ResponseHead, SegmentedFetcher, Stage,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct MockError(String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    method: &'static str,
    range: Option<String>,
}

/// Ways the server misbehaves for the range starting at a given offset.
#[derive(Debug, Clone, Copy)]
enum Tamper {
    /// 206 without length headers, followed by this many extra bytes.
    Overrun(usize),
    /// `Content-Length` one byte larger than the body.
    LongerLength,
    /// `Content-Range` shifted one byte forward.
    ShiftedRange,
    /// 200 with the whole resource instead of the requested slice.
    WholeBody,
    Panic,
}

/// Serves one resource from memory and records every request.
#[derive(Clone)]
struct MockServer {
    body: Bytes,
    accept_ranges: Option<&'static str>,
    chunk: usize,
    /// Ranges starting at this offset are cut short and sent without length
    /// headers.
    truncate_at: Option<u64>,
    /// Ranges starting at these offsets send one chunk and then hang.
    stall_at: Vec<u64>,
    tamper: Option<(u64, Tamper)>,
    /// The probe is never answered.
    silent_probe: bool,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockServer {
    fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            accept_ranges: Some("bytes"),
            chunk: 4096,
            truncate_at: None,
            stall_at: Vec::new(),
            tamper: None,
            silent_probe: false,
            requests: Arc::default(),
        }
    }

    fn accept_ranges(mut self, value: Option<&'static str>) -> Self {
        self.accept_ranges = value;
        self
    }

    fn truncate_at(mut self, offset: u64) -> Self {
        self.truncate_at = Some(offset);
        self
    }

    fn stall_at(mut self, offset: u64) -> Self {
        self.stall_at.push(offset);
        self
    }

    fn tamper(mut self, offset: u64, tamper: Tamper) -> Self {
        self.tamper = Some((offset, tamper));
        self
    }

    fn silent_probe(mut self) -> Self {
        self.silent_probe = true;
        self
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn range_requests(&self) -> Vec<String> {
        let mut ranges: Vec<String> = self
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .filter_map(|r| r.range)
            .collect();
        ranges.sort_by_key(|r| parse_range(r).0);
        ranges
    }

    fn record(&self, method: &'static str, range: Option<&str>) {
        self.requests.lock().unwrap().push(Request {
            method,
            range: range.map(str::to_string),
        });
    }
}

fn parse_range(header: &str) -> (u64, u64) {
    let (first, last) = header
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .unwrap();
    (first.parse().unwrap(), last.parse().unwrap())
}

impl HttpClient for MockServer {
    type Error = MockError;

    async fn probe(
        &self,
        _url: &str,
        method: ProbeMethod,
        _headers: &[(String, String)],
    ) -> Result<ResponseHead, Self::Error> {
        self.record(if method == ProbeMethod::Head { "HEAD" } else { "GET" }, None);
        if self.silent_probe {
            std::future::pending::<()>().await;
        }
        Ok(ResponseHead {
            status: 200,
            content_length: Some(self.body.len() as u64),
            accept_ranges: self.accept_ranges.map(str::to_string),
            content_range: None,
        })
    }

    async fn get(
        &self,
        _url: &str,
        range: Option<&str>,
        _headers: &[(String, String)],
    ) -> Result<Response<Self::Error>, Self::Error> {
        self.record("GET", range);

        let (status, first, mut slice, content_range) = match range {
            Some(header) => {
                let (first, last) = parse_range(header);
                let slice = self.body.slice(first as usize..=last as usize);
                let content_range = format!("bytes {first}-{last}/{}", self.body.len());
                (206, first, slice, Some(content_range))
            }
            None => (200, 0, self.body.clone(), None),
        };

        let mut head = ResponseHead {
            status,
            content_length: Some(slice.len() as u64),
            accept_ranges: None,
            content_range,
        };
        if self.truncate_at == Some(first) {
            slice.truncate(slice.len() / 2);
            head.content_length = None;
            head.content_range = None;
        }
        match self.tamper {
            Some((offset, tamper)) if offset == first => match tamper {
                Tamper::Overrun(extra) => {
                    let mut longer = slice.to_vec();
                    longer.extend(std::iter::repeat_n(0xAA, extra));
                    slice = Bytes::from(longer);
                    head.content_length = None;
                    head.content_range = None;
                }
                Tamper::LongerLength => head.content_length = Some(slice.len() as u64 + 1),
                Tamper::ShiftedRange => {
                    let last = first + slice.len() as u64;
                    head.content_range =
                        Some(format!("bytes {}-{last}/{}", first + 1, self.body.len()));
                }
                Tamper::WholeBody => {
                    slice = self.body.clone();
                    head.status = 200;
                    head.content_length = Some(slice.len() as u64);
                    head.content_range = None;
                }
                Tamper::Panic => panic!("server blew up on the range at {offset}"),
            },
            _ => {}
        }

        let chunks: Vec<Result<Bytes, MockError>> = slice
            .chunks(self.chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let body = if self.stall_at.contains(&first) {
            stream::iter(chunks.into_iter().take(1))
                .chain(stream::pending())
                .boxed()
        } else {
            stream::iter(chunks).boxed()
        };

        Ok(Response { head, body })
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

const URL: &str = "http://mock.test/dist/resource.bin";

#[tokio::test]
async fn four_workers_split_a_million_bytes() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("resource.bin");
    let body = sample(1_000_000);
    let server = MockServer::new(body.clone());

    let fetcher = SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().worker_count(4));
    let state = fetcher.subscribe();
    let report = fetcher.fetch(URL, &dest).await.unwrap();

    assert_eq!(
        server.range_requests(),
        vec![
            "bytes=0-249999",
            "bytes=250000-499999",
            "bytes=500000-749999",
            "bytes=750000-999999",
        ]
    );
    assert_eq!(server.requests()[0].method, "HEAD");
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(report.bytes_written, 1_000_000);
    assert_eq!(report.task.worker_count, 4);
    assert!(report.task.range_supported);
    assert!(report.progress.is_complete());
    assert_eq!(*state.borrow(), FetchState::Completed);
}

#[tokio::test]
async fn uneven_split_gives_remainder_to_last_range() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("seven.bin");
    let server = MockServer::new(&b"abcdefg"[..]);

    SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().worker_count(3))
        .fetch(URL, &dest)
        .await
        .unwrap();

    assert_eq!(
        server.range_requests(),
        vec!["bytes=0-1", "bytes=2-3", "bytes=4-6"]
    );
    assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefg");
}

#[tokio::test]
async fn no_range_support_uses_one_plain_get() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("plain.bin");
    let body = sample(50_000);

    for accept in [None, Some("none")] {
        let server = MockServer::new(body.clone()).accept_ranges(accept);
        let _ = std::fs::remove_file(&dest);

        let report = SegmentedFetcher::new(server.clone())
            .with_options(FetchOptions::default().worker_count(8))
            .fetch(URL, &dest)
            .await
            .unwrap();

        let gets: Vec<Request> = server
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .collect();
        assert_eq!(
            gets,
            vec![Request {
                method: "GET",
                range: None
            }]
        );
        assert_eq!(report.task.worker_count, 1);
        assert!(!report.task.range_supported);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }
}

#[tokio::test]
async fn existing_destination_is_rejected_before_any_request() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("exists.bin");
    std::fs::write(&dest, b"previous").unwrap();
    let server = MockServer::new(sample(100));

    let fetcher = SegmentedFetcher::new(server.clone());
    let err = fetcher.fetch(URL, &dest).await.unwrap_err();

    assert!(matches!(err, Error::DestinationExists { ref path } if path == &dest));
    assert!(server.requests().is_empty());
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    assert_eq!(fetcher.state(), FetchState::Failed);
}

#[tokio::test]
async fn replace_policy_overwrites_existing_destination() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("exists.bin");
    std::fs::write(&dest, vec![0xAA; 500]).unwrap();
    let body = sample(100);

    SegmentedFetcher::new(MockServer::new(body.clone()))
        .with_options(FetchOptions::default().overwrite(OverwritePolicy::Replace))
        .fetch(URL, &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn zero_workers_fails_without_network() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(10));

    let err = SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().worker_count(0))
        .fetch(URL, &dir.path().join("x"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn short_range_fails_the_whole_run() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("short.bin");
    // Ranges of 100 bytes: the one starting at 200 is index 2.
    let server = MockServer::new(sample(400)).truncate_at(200);

    let fetcher = SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().worker_count(4));
    let err = fetcher.fetch(URL, &dest).await.unwrap_err();

    assert!(matches!(
        err,
        Error::ShortRead {
            index: 2,
            expected: 100,
            received: 50
        }
    ));
    assert_eq!(fetcher.state(), FetchState::Failed);
    // The partial file stays where it was written.
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 400);
}

#[tokio::test]
async fn failing_range_cancels_stalled_siblings() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("cancel.bin");
    let server = MockServer::new(sample(40_000))
        .truncate_at(20_000)
        .stall_at(0);

    let fetcher = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(2));
    let run = fetcher.fetch(URL, &dest);
    let err = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("stalled sibling was not cancelled")
        .unwrap_err();

    assert!(matches!(err, Error::ShortRead { index: 1, .. }), "{err}");
}

#[tokio::test]
async fn external_cancellation_stops_the_run() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("cancelled.bin");
    let server = MockServer::new(sample(20_000)).stall_at(0).stall_at(10_000);
    let token = CancellationToken::new();

    let fetcher = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(2))
        .with_cancellation(token.clone());
    let mut state = fetcher.subscribe();

    let canceller = tokio::spawn(async move {
        state
            .wait_for(|s| *s == FetchState::Downloading)
            .await
            .unwrap();
        token.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(URL, &dest))
        .await
        .expect("cancellation was not observed")
        .unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
}

#[tokio::test]
async fn overall_timeout_fails_with_timed_out() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("slow.bin");
    let server = MockServer::new(sample(20_000)).stall_at(0);

    let err = SegmentedFetcher::new(server)
        .with_options(
            FetchOptions::default()
                .worker_count(2)
                .timeout(Some(Duration::from_millis(100))),
        )
        .fetch(URL, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TimedOut));
}

#[tokio::test]
async fn empty_resource_completes_without_range_requests() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("empty.bin");
    let server = MockServer::new(Bytes::new());

    let report = SegmentedFetcher::new(server.clone())
        .fetch(URL, &dest)
        .await
        .unwrap();

    assert_eq!(report.bytes_written, 0);
    assert_eq!(report.task.worker_count, 1);
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    assert_eq!(server.requests().len(), 1);
    assert_eq!(server.requests()[0].method, "HEAD");
}

#[tokio::test]
async fn strict_policy_rejects_foreign_range_unit() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(10)).accept_ranges(Some("records"));

    let err = SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().range_units(RangeUnitPolicy::Strict))
        .fetch(URL, &dir.path().join("r.bin"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedRangeUnit { .. }));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn get_probe_is_used_when_requested() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(10));

    SegmentedFetcher::new(server.clone())
        .with_options(FetchOptions::default().probe_method(ProbeMethod::Get))
        .fetch(URL, &dir.path().join("g.bin"))
        .await
        .unwrap();

    assert_eq!(
        server.requests()[0],
        Request {
            method: "GET",
            range: None
        }
    );
}

#[derive(Clone, Default)]
struct RecordingSink {
    progress: Arc<Mutex<HashMap<u32, Vec<u64>>>>,
    finished: Arc<Mutex<Vec<u32>>>,
}

impl ProgressSink for RecordingSink {
    fn set_total(&mut self, _range_index: u32, _total_bytes: u64) {}

    fn set_progress(&mut self, range_index: u32, bytes_written: u64) {
        self.progress
            .lock()
            .unwrap()
            .entry(range_index)
            .or_default()
            .push(bytes_written);
    }

    fn finish(&mut self, range_index: u32) {
        self.finished.lock().unwrap().push(range_index);
    }
}

#[tokio::test]
async fn progress_is_monotonic_per_range() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("progress.bin");
    let sink = RecordingSink::default();
    let mut server = MockServer::new(sample(300_000));
    server.chunk = 1000;

    SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(3))
        .fetch_with_progress(URL, &dest, sink.clone())
        .await
        .unwrap();

    let progress = sink.progress.lock().unwrap();
    assert_eq!(progress.len(), 3);
    for (index, values) in progress.iter() {
        assert!(
            values.windows(2).all(|w| w[0] < w[1]),
            "range {index} went backwards: {values:?}"
        );
        assert_eq!(values.last(), Some(&100_000));
        // One update per percent at most.
        assert!(values.len() <= 101, "range {index} sent {} updates", values.len());
    }

    let mut finished = sink.finished.lock().unwrap().clone();
    finished.sort_unstable();
    assert_eq!(finished, vec![0, 1, 2]);
}

#[tokio::test]
async fn report_serializes_to_json() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("json.bin");

    let report = SegmentedFetcher::new(MockServer::new(sample(64)))
        .fetch(URL, Path::new(&dest))
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["bytes_written"], 64);
    assert_eq!(json["task"]["source_url"], URL);
    assert_eq!(json["progress"]["ranges"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn cancellation_reaches_an_unanswered_probe() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(64)).silent_probe();
    let token = CancellationToken::new();

    let fetcher = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default())
        .with_cancellation(token.clone());
    let mut state = fetcher.subscribe();
    let canceller = tokio::spawn(async move {
        state.wait_for(|s| *s == FetchState::Probing).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        fetcher.fetch(URL, &dir.path().join("never.bin")),
    )
    .await
    .expect("run hung in the probe after cancellation")
    .unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    assert_eq!(fetcher.state(), FetchState::Failed);
    assert!(!dir.path().join("never.bin").exists());
}

#[tokio::test]
async fn timeout_covers_an_unanswered_probe() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(64)).silent_probe();

    let fetcher = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().timeout(Some(Duration::from_millis(100))));
    let never = dir.path().join("never.bin");
    let run = fetcher.fetch(URL, &never);
    let err = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run hung in the probe past its deadline")
        .unwrap_err();

    assert!(matches!(err, Error::TimedOut));
}

#[tokio::test]
async fn oversized_body_is_rejected_before_writing() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("overrun.bin");
    let server = MockServer::new(sample(8)).tamper(0, Tamper::Overrun(2));

    let err = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(1))
        .fetch(URL, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Overrun { index: 0, expected: 8 }), "{err}");
    // Nothing was written, inside the range or past it.
    assert_eq!(std::fs::read(&dest).unwrap(), vec![0u8; 8]);
}

#[tokio::test]
async fn declared_length_must_match_the_range() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(8)).tamper(4, Tamper::LongerLength);

    let err = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(2))
        .fetch(URL, &dir.path().join("length.bin"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::LengthMismatch {
                index: 1,
                expected: 4,
                declared: 5
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn served_range_must_start_where_requested() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(8)).tamper(4, Tamper::ShiftedRange);

    let err = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(2))
        .fetch(URL, &dir.path().join("shifted.bin"))
        .await
        .unwrap_err();

    match err {
        Error::RangeMismatch {
            index,
            requested,
            served,
        } => {
            assert_eq!(index, 1);
            assert_eq!(requested, "bytes=4-7");
            assert_eq!(served, "bytes 5-8/8");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn full_body_for_a_partial_range_is_refused() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(8)).tamper(4, Tamper::WholeBody);

    let err = SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(2))
        .fetch(URL, &dir.path().join("whole.bin"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::HttpStatus {
                stage: Stage::Range(1),
                status: 200
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn full_body_is_accepted_when_the_range_spans_the_resource() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("single.bin");
    let body = sample(8);
    let server = MockServer::new(body.clone()).tamper(0, Tamper::WholeBody);

    SegmentedFetcher::new(server)
        .with_options(FetchOptions::default().worker_count(1))
        .fetch(URL, &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn panicking_worker_is_reported() {
    let dir = tempdir().unwrap();
    let server = MockServer::new(sample(8)).tamper(4, Tamper::Panic);

    let fetcher =
        SegmentedFetcher::new(server).with_options(FetchOptions::default().worker_count(2));
    let err = fetcher
        .fetch(URL, &dir.path().join("panic.bin"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::WorkerPanicked { index: 1 }), "{err}");
    assert_eq!(fetcher.state(), FetchState::Failed);
}
