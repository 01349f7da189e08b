// Shared paint raster: a fixed 64x64 RGBA grid mirrored from the server.
// Deltas arrive as ordered pixel events; a periodic full snapshot replace
// heals anything the delta stream missed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const PAINT_WIDTH: usize = 64;
pub const PAINT_HEIGHT: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PixelWrite {
    pub x: u32,
    pub y: u32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// One entry of the server's paint event log. Ids are opaque but totally
/// ordered by emission; we only ever compare the cursor for "after".
#[derive(Clone, Debug, Deserialize)]
pub struct PaintEvent {
    pub id: String,
    pub pixels: Vec<PixelWrite>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("snapshot is {got} bytes, expected {want}")]
    WrongSize { got: usize, want: usize },
}

pub struct PaintBuffer {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    /// Last applied event id; None until the first delta batch lands.
    pub cursor: Option<String>,
    /// Bumped on every visible change, watched by the renderer.
    pub revision: u64,
}

impl PaintBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        PaintBuffer {
            width,
            height,
            pixels: vec![0; width * height * 4],
            cursor: None,
            revision: 0,
        }
    }

    /// Materialize from a base64 full snapshot of raw RGBA bytes. This is
    /// the resync path: the server state replaces ours wholesale and the
    /// cursor resets, so the next delta poll starts from scratch.
    pub fn replace_from_snapshot(&mut self, rgba_b64: &str) -> Result<(), SnapshotError> {
        let bytes = STANDARD.decode(rgba_b64)?;
        let want = self.width * self.height * 4;
        if bytes.len() != want {
            return Err(SnapshotError::WrongSize { got: bytes.len(), want });
        }
        self.pixels = bytes;
        self.cursor = None;
        self.revision += 1;
        Ok(())
    }

    /// Apply one event's writes. Unconditional overwrites, so replaying an
    /// event is harmless. Out-of-range coordinates are skipped per pixel;
    /// the server is expected to stay in bounds but a bad write must not
    /// corrupt neighbouring rows.
    pub fn apply_event(&mut self, event: &PaintEvent) {
        for p in &event.pixels {
            let (x, y) = (p.x as usize, p.y as usize);
            if x >= self.width || y >= self.height {
                log::debug!("paint event {}: pixel ({}, {}) out of range", event.id, p.x, p.y);
                continue;
            }
            let idx = (y * self.width + x) * 4;
            self.pixels[idx] = p.r;
            self.pixels[idx + 1] = p.g;
            self.pixels[idx + 2] = p.b;
            self.pixels[idx + 3] = p.a;
        }
    }

    /// Apply an ordered batch and advance the cursor to the last id.
    /// Returns true if anything was applied (a redraw is due).
    pub fn apply_batch(&mut self, events: &[PaintEvent]) -> bool {
        if events.is_empty() {
            return false;
        }
        for event in events {
            self.apply_event(event);
        }
        self.cursor = Some(events[events.len() - 1].id.clone());
        self.revision += 1;
        true
    }

    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8, u8) {
        let idx = (y * self.width + x) * 4;
        (self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2], self.pixels[idx + 3])
    }

    /// Encode the current raster as a PNG, used by snapshot and gallery
    /// uploads.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut out);
        image::ImageEncoder::write_image(
            encoder,
            &self.pixels,
            self.width as u32,
            self.height as u32,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(out)
    }
}

/// Coalesces redraw signals: bursts of pixel events collapse to at most one
/// signal per window.
pub struct RedrawGate {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RedrawGate {
    pub fn new(min_interval: Duration) -> Self {
        RedrawGate { min_interval, last: None }
    }

    pub fn try_signal(&mut self) -> bool {
        self.try_signal_at(Instant::now())
    }

    fn try_signal_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
