use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of identity document the user was asked to present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    DrivingLicense,
    IdCard,
    Passport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSide {
    Front,
    Back,
}

/// Label produced by the document classifier.
///
/// Driving licenses and ID cards share the generic card labels; passports
/// have a single label because they have no back side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLabel {
    IdCardFront,
    IdCardBack,
    Passport,
    Invalid,
}

impl DocumentLabel {
    /// Whether this label satisfies a request for `(wanted_type, wanted_side)`.
    pub fn matches(self, wanted_type: DocumentType, wanted_side: DocumentSide) -> bool {
        match (wanted_type, wanted_side, self) {
            (DocumentType::DrivingLicense | DocumentType::IdCard, DocumentSide::Front, Self::IdCardFront) => true,
            (DocumentType::DrivingLicense | DocumentType::IdCard, DocumentSide::Back, Self::IdCardBack) => true,
            (DocumentType::Passport, _, Self::Passport) => true,
            _ => false,
        }
    }
}

/// Axis-aligned box in normalized image coordinates (0..1, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union. Two empty boxes have an IoU of 0.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= f32::EPSILON {
            return 0.0;
        }
        intersection / union
    }
}

/// Camera state captured at the moment a frame is submitted for scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub is_adjusting_focus: bool,
    pub lens_position: Option<f32>,
    pub exposure_duration_ms: Option<f64>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceSnapshot {
    pub fn new(is_adjusting_focus: bool) -> Self {
        Self {
            is_adjusting_focus,
            lens_position: None,
            exposure_duration_ms: None,
            captured_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseDocumentError {
    kind: &'static str,
    value: String,
}

impl FromStr for DocumentType {
    type Err = ParseDocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driving_license" => Ok(Self::DrivingLicense),
            "id_card" => Ok(Self::IdCard),
            "passport" => Ok(Self::Passport),
            other => Err(ParseDocumentError {
                kind: "document type",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for DocumentSide {
    type Err = ParseDocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            other => Err(ParseDocumentError {
                kind: "document side",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IdCardFront => "id_card_front",
            Self::IdCardBack => "id_card_back",
            Self::Passport => "passport",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}
