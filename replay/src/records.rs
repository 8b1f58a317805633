use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use frame_scan_common::document::{BoundingBox, DocumentLabel};
use frame_scan_common::frame::{Frame, FramePayload};
use frame_scan_core::{ClassificationResult, Classifier, DetectionError};
use image::ImageReader;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ReplayError;

/// One line of a recorded detections file.
///
/// Either a classification (`label`, `confidence`, `bounds`), an `error`
/// string, or neither when the model found no document.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRecord {
    pub seq: u64,
    pub label: Option<DocumentLabel>,
    #[serde(default)]
    pub confidence: f32,
    pub bounds: Option<BoundingBox>,
    pub error: Option<String>,
    #[serde(default)]
    pub adjusting_focus: bool,
}

/// Replays recorded classifier output for a captured session.
///
/// Each frame is still decoded, so corrupt captures surface as
/// `MalformedFrame` and the decode cost stands in for preprocessing.
pub struct RecordedClassifier {
    records: HashMap<u64, DetectionRecord>,
    latency: Duration,
}

impl RecordedClassifier {
    pub fn load(path: &Path, latency: Duration) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::Io(path.display().to_string(), e))?;
        let classifier = Self::parse(&content, latency)?;
        info!(
            path = %path.display(),
            records = classifier.len(),
            "loaded recorded detections"
        );
        Ok(classifier)
    }

    pub fn parse(content: &str, latency: Duration) -> Result<Self, ReplayError> {
        let mut records = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: DetectionRecord = serde_json::from_str(line)
                .map_err(|e| ReplayError::Record(idx + 1, e))?;
            records.insert(record.seq, record);
        }
        Ok(Self { records, latency })
    }

    pub fn adjusting_focus(&self, seq: u64) -> bool {
        self.records.get(&seq).is_some_and(|r| r.adjusting_focus)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn decode(frame: &Frame) -> Result<(), DetectionError> {
        match &frame.payload {
            FramePayload::Jpeg(data) => {
                ImageReader::new(Cursor::new(&data[..]))
                    .with_guessed_format()
                    .map_err(|e| DetectionError::MalformedFrame(e.to_string()))?
                    .decode()
                    .map_err(|e| DetectionError::MalformedFrame(e.to_string()))?;
                Ok(())
            }
            FramePayload::Raw { .. } if frame.is_well_formed() => Ok(()),
            FramePayload::Raw { .. } => Err(DetectionError::MalformedFrame(format!(
                "raw buffer size mismatch ({} bytes)",
                frame.payload_size()
            ))),
        }
    }
}

impl Classifier for RecordedClassifier {
    fn classify(&self, frame: &Frame) -> Result<Option<ClassificationResult>, DetectionError> {
        Self::decode(frame)?;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let Some(record) = self.records.get(&frame.seq) else {
            debug!(seq = frame.seq, "no recorded detection, treating as no document");
            return Ok(None);
        };
        if let Some(error) = &record.error {
            return Err(DetectionError::Inference(error.clone()));
        }
        match (record.label, record.bounds) {
            (Some(label), Some(document_bounds)) => Ok(Some(ClassificationResult {
                document_bounds,
                label,
                confidence: record.confidence,
            })),
            _ => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "recorded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SESSION: &str = r#"
# session-01, pixel 7 rear camera
{"seq":1,"label":"id_card_front","confidence":0.93,"bounds":{"x":0.1,"y":0.2,"width":0.8,"height":0.5}}
{"seq":2,"error":"delegate failed to allocate tensors"}
{"seq":3,"adjusting_focus":true}
"#;

    fn jpeg_frame(seq: u64) -> Frame {
        let img = image::RgbImage::new(4, 4);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        Frame::jpeg(buf.into_inner(), 1000, seq)
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let classifier = RecordedClassifier::parse(SESSION, Duration::ZERO).unwrap();
        assert_eq!(classifier.len(), 3);
        assert!(classifier.adjusting_focus(3));
        assert!(!classifier.adjusting_focus(1));
        assert!(!classifier.adjusting_focus(99));
    }

    #[test]
    fn bad_line_reports_line_number() {
        let err = RecordedClassifier::parse("{\"seq\":1}\n{not json}\n", Duration::ZERO)
            .err()
            .unwrap();
        assert!(matches!(err, ReplayError::Record(2, _)));
    }

    #[test]
    fn replays_each_record_kind() {
        let classifier = RecordedClassifier::parse(SESSION, Duration::ZERO).unwrap();

        let found = classifier.classify(&jpeg_frame(1)).unwrap().unwrap();
        assert_eq!(found.label, DocumentLabel::IdCardFront);
        assert!((found.confidence - 0.93).abs() < 1e-6);

        let failed = classifier.classify(&jpeg_frame(2)).unwrap_err();
        assert!(matches!(failed, DetectionError::Inference(_)));

        assert!(classifier.classify(&jpeg_frame(3)).unwrap().is_none());
        assert!(classifier.classify(&jpeg_frame(4)).unwrap().is_none());
    }

    #[test]
    fn corrupt_frame_is_malformed() {
        let classifier = RecordedClassifier::parse(SESSION, Duration::ZERO).unwrap();
        let corrupt = Frame::jpeg(vec![0xFF, 0xD8, 0x00, 0x00], 1000, 1);
        assert!(matches!(
            classifier.classify(&corrupt),
            Err(DetectionError::MalformedFrame(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SESSION.as_bytes()).unwrap();
        let classifier = RecordedClassifier::load(file.path(), Duration::ZERO).unwrap();
        assert_eq!(classifier.len(), 3);
    }
}
