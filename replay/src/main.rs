mod records;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use frame_scan_common::config::{Config, ConfigError};
use frame_scan_common::document::{DeviceSnapshot, DocumentSide, DocumentType, ParseDocumentError};
use frame_scan_common::frame::Frame;
use frame_scan_core::{ScanError, ScanOutcome, Scanner, TracingEventSink};
use records::RecordedClassifier;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("bad detection record on line {0}: {1}")]
    Record(usize, serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("config has no [replay] section")]
    MissingReplaySection,
    #[error("invalid replay target: {0}")]
    InvalidDocument(#[from] ParseDocumentError),
    #[error("scanner error: {0}")]
    Scan(#[from] ScanError),
    #[error("producer task failed: {0}")]
    Producer(#[from] tokio::task::JoinError),
}

/// Per-outcome counts for one replayed session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    high_quality: u64,
    low_quality: u64,
    no_document: u64,
    failed: u64,
}

impl Tally {
    fn record(&mut self, outcome: &ScanOutcome, wanted_type: DocumentType, wanted_side: DocumentSide) {
        match outcome {
            ScanOutcome::Scanned(verdict) if verdict.is_high_quality(wanted_type, wanted_side) => {
                self.high_quality += 1
            }
            ScanOutcome::Scanned(_) => self.low_quality += 1,
            ScanOutcome::NoDocument { .. } => self.no_document += 1,
            ScanOutcome::Failed { .. } => self.failed += 1,
        }
    }

    fn total(&self) -> u64 {
        self.high_quality + self.low_quality + self.no_document + self.failed
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    match run(config).await {
        Ok(tally) => info!(
            high_quality = tally.high_quality,
            low_quality = tally.low_quality,
            no_document = tally.no_document,
            failed = tally.failed,
            "replay finished"
        ),
        Err(e) => {
            error!(error = %e, "replay failed");
            std::process::exit(1);
        }
    }
}

async fn run(config: Config) -> Result<Tally, ReplayError> {
    let replay = config.replay.clone().ok_or(ReplayError::MissingReplaySection)?;
    let wanted_type: DocumentType = replay.document_type.parse()?;
    let wanted_side: DocumentSide = replay.document_side.parse()?;

    let frames = list_frames(&replay.frames_dir)?;
    let classifier = Arc::new(RecordedClassifier::load(
        &replay.detections_path,
        Duration::from_millis(replay.latency_ms),
    )?);
    let scanner = Arc::new(
        Scanner::from_config(&config, classifier.clone(), Handle::current())?
            .with_event_sink(Arc::new(TracingEventSink)),
    );

    info!(
        frames = frames.len(),
        fps = replay.fps,
        document_type = replay.document_type,
        document_side = replay.document_side,
        "starting replay"
    );

    let reporter = {
        let scanner = Arc::clone(&scanner);
        let period = Duration::from_secs(config.stats.report_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scanner.reset();
            }
        })
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let producer = {
        let scanner = Arc::clone(&scanner);
        let pace = frame_interval(replay.fps);
        let delivery = Handle::current();
        // Admission blocks the submitting thread, so the producer stays off the async workers.
        tokio::task::spawn_blocking(move || {
            produce(&scanner, &classifier, &frames, pace, &delivery, &tx)
        })
    };

    let mut tally = Tally::default();
    while let Some(outcome) = rx.recv().await {
        tally.record(&outcome, wanted_type, wanted_side);
    }
    let submitted = producer.await?;
    reporter.abort();
    scanner.reset();

    if tally.total() != submitted {
        warn!(submitted, delivered = tally.total(), "some scans were never delivered");
    }
    Ok(tally)
}

/// Submit every frame in order, sleeping to hold `pace` between submissions.
///
/// Returns how many frames were handed to the scanner.
fn produce(
    scanner: &Scanner,
    classifier: &RecordedClassifier,
    frames: &[PathBuf],
    pace: Option<Duration>,
    delivery: &Handle,
    results: &mpsc::UnboundedSender<ScanOutcome>,
) -> u64 {
    let mut submitted = 0;
    for (idx, path) in frames.iter().enumerate() {
        let started = Instant::now();
        let seq = idx as u64 + 1;

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                continue;
            }
        };
        let frame = Frame::jpeg(data, chrono::Utc::now().timestamp_millis(), seq);

        let session = move || -> Option<DeviceSnapshot> {
            Some(DeviceSnapshot::new(classifier.adjusting_focus(seq)))
        };
        let tx = results.clone();
        scanner.scan_image(frame, &session, delivery.clone(), move |outcome| {
            // The collector only goes away once the run is over.
            let _ = tx.send(outcome);
        });
        submitted += 1;

        if let Some(rest) = pace.and_then(|p| p.checked_sub(started.elapsed())) {
            std::thread::sleep(rest);
        }
    }
    submitted
}

/// Submission interval for `fps`, or `None` to submit as fast as admission allows.
fn frame_interval(fps: f64) -> Option<Duration> {
    (fps.is_finite() && fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps))
}

/// JPEG files in `dir`, sorted by file name. Their order defines frame sequence numbers.
fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, ReplayError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| ReplayError::Io(dir.display().to_string(), e))?;
    let mut frames = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ReplayError::Io(dir.display().to_string(), e))?
            .path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_jpeg(path: &Path) {
        let img = image::RgbImage::new(8, 8);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        std::fs::write(path, buf.into_inner()).unwrap();
    }

    #[test]
    fn frames_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0002.jpg", "frame_0001.JPG", "frame_0003.jpeg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let names: Vec<_> = list_frames(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_0001.JPG", "frame_0002.jpg", "frame_0003.jpeg"]);
    }

    #[test]
    fn missing_frames_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_frames(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ReplayError::Io(..)));
    }

    #[test]
    fn pacing_from_fps() {
        assert_eq!(frame_interval(4.0), Some(Duration::from_millis(250)));
        assert_eq!(frame_interval(0.0), None);
        assert_eq!(frame_interval(f64::NAN), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replays_a_recorded_session() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();
        for seq in 1..=4 {
            write_jpeg(&frames_dir.join(format!("frame_{seq:04}.jpg")));
        }
        // Frame 4 has no record and counts as no document.
        let detections = dir.path().join("detections.jsonl");
        std::fs::write(
            &detections,
            concat!(
                r#"{"seq":1,"label":"id_card_front","confidence":0.9,"bounds":{"x":0.1,"y":0.1,"width":0.8,"height":0.5}}"#,
                "\n",
                r#"{"seq":2,"error":"tensor allocation failed"}"#,
                "\n",
                r#"{"seq":3,"label":"id_card_back","confidence":0.8,"bounds":{"x":0.1,"y":0.1,"width":0.8,"height":0.5}}"#,
                "\n",
            ),
        )
        .unwrap();

        let config = Config::parse(&format!(
            r#"
[motion]
min_stable_frames = 0

[replay]
frames_dir = '{}'
detections_path = '{}'
fps = 0.0
document_type = "id_card"
document_side = "front"
"#,
            frames_dir.display(),
            detections.display()
        ))
        .unwrap();

        let tally = run(config).await.unwrap();
        assert_eq!(
            tally,
            Tally {
                high_quality: 1,
                low_quality: 1,
                no_document: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn run_requires_replay_section() {
        let config = Config::parse("").unwrap();
        assert!(matches!(
            run(config).await,
            Err(ReplayError::MissingReplaySection)
        ));
    }

    #[test]
    fn tally_counts_by_kind() {
        let mut tally = Tally::default();
        tally.record(&ScanOutcome::NoDocument { seq: 1 }, DocumentType::Passport, DocumentSide::Front);
        tally.record(
            &ScanOutcome::Failed {
                seq: 2,
                error: frame_scan_core::DetectionError::Inference("oom".into()),
            },
            DocumentType::Passport,
            DocumentSide::Front,
        );
        assert_eq!(tally.no_document, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.total(), 2);
    }
}
