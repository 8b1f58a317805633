use bytes::Bytes;

/// Pixel data carried inside a frame.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Compressed JPEG frame (recorded sessions, MJPEG sources).
    Jpeg(Bytes),
    /// Uncompressed 8-bit pixels straight from the camera pipeline.
    Raw {
        width: u32,
        height: u32,
        /// Bytes per pixel: 1 = luma, 4 = RGBA.
        channels: u8,
        data: Bytes,
    },
}

/// A camera frame with capture metadata.
///
/// Cloning is cheap: the payload is reference counted, and the pixel buffer is
/// freed when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: FramePayload,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn jpeg(data: impl Into<Bytes>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            payload: FramePayload::Jpeg(data.into()),
            captured_at_ms,
            seq,
        }
    }

    pub fn raw(
        width: u32,
        height: u32,
        channels: u8,
        data: impl Into<Bytes>,
        captured_at_ms: i64,
        seq: u64,
    ) -> Self {
        Self {
            payload: FramePayload::Raw {
                width,
                height,
                channels,
                data: data.into(),
            },
            captured_at_ms,
            seq,
        }
    }

    /// Returns the JPEG data if this is a JPEG frame.
    pub fn jpeg_data(&self) -> Option<&[u8]> {
        match &self.payload {
            FramePayload::Jpeg(data) => Some(data),
            _ => None,
        }
    }

    /// Returns (width, height) for raw frames. JPEG dimensions are only known after decoding.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.payload {
            FramePayload::Raw { width, height, .. } => Some((*width, *height)),
            FramePayload::Jpeg(_) => None,
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload_bytes().len()
    }

    pub fn payload_bytes(&self) -> &[u8] {
        match &self.payload {
            FramePayload::Jpeg(data) => data,
            FramePayload::Raw { data, .. } => data,
        }
    }

    /// JPEG frames must start with the SOI marker. Raw frames must hold exactly
    /// `width * height * channels` bytes.
    pub fn is_well_formed(&self) -> bool {
        match &self.payload {
            FramePayload::Jpeg(data) => data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8,
            FramePayload::Raw {
                width,
                height,
                channels,
                data,
            } => {
                let expected = *width as usize * *height as usize * *channels as usize;
                expected > 0 && data.len() == expected
            }
        }
    }

    /// Capture time as a UTC timestamp, falling back to now for out-of-range values.
    pub fn captured_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
    }
}
