//! Canvas query description: positioned sub-queries on a unit canvas.

use serde::{Deserialize, Serialize};

use crate::error::{FrameHunterError, Result};

/// Axis-aligned rectangle in fractional canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RelativeRect {
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The whole canvas.
    #[must_use]
    pub const fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f32 {
        let w = self.right.min(other.right) - self.left.max(other.left);
        let h = self.bottom.min(other.bottom) - self.top.max(other.top);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    /// Intersection over union, zero for disjoint or degenerate rectangles.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    pub fn validate(&self) -> Result<()> {
        let coords = [self.left, self.top, self.right, self.bottom];
        if coords.iter().any(|c| !c.is_finite() || *c < 0.0 || *c > 1.0) {
            return Err(FrameHunterError::InvalidQuery {
                reason: format!("canvas rectangle {self:?} leaves the unit square"),
            });
        }
        if self.left > self.right || self.top > self.bottom {
            return Err(FrameHunterError::InvalidQuery {
                reason: format!("canvas rectangle {self:?} is inverted"),
            });
        }
        Ok(())
    }
}

/// Small raster drawn or pasted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasBitmap {
    pub width: u32,
    pub height: u32,
    /// 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl CanvasBitmap {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.channels, 3 | 4) {
            return Err(FrameHunterError::InvalidQuery {
                reason: format!("bitmap has {} channels, expected 3 or 4", self.channels),
            });
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if expected == 0 || self.pixels.len() != expected {
            return Err(FrameHunterError::InvalidQuery {
                reason: format!(
                    "bitmap {}x{}x{} carries {} bytes",
                    self.width,
                    self.height,
                    self.channels,
                    self.pixels.len()
                ),
            });
        }
        Ok(())
    }

    /// Pixels with any alpha channel dropped.
    #[must_use]
    pub fn rgb(&self) -> Vec<u8> {
        if self.channels == 3 {
            return self.pixels.clone();
        }
        self.pixels
            .chunks_exact(self.channels as usize)
            .flat_map(|px| px[..3].iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasPayload {
    Bitmap(CanvasBitmap),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSubquery {
    pub rect: RelativeRect,
    pub payload: CanvasPayload,
}

impl CanvasSubquery {
    #[must_use]
    pub fn text(rect: RelativeRect, text: impl Into<String>) -> Self {
        Self {
            rect,
            payload: CanvasPayload::Text(text.into()),
        }
    }

    #[must_use]
    pub fn bitmap(rect: RelativeRect, bitmap: CanvasBitmap) -> Self {
        Self {
            rect,
            payload: CanvasPayload::Bitmap(bitmap),
        }
    }
}

/// Ordered list of positioned sub-queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasQuery {
    #[serde(default)]
    pub subqueries: Vec<CanvasSubquery>,
}

impl CanvasQuery {
    #[must_use]
    pub fn new(subqueries: Vec<CanvasSubquery>) -> Self {
        Self { subqueries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subqueries.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.subqueries.is_empty() {
            return Err(FrameHunterError::EmptyCanvas);
        }
        for sub in &self.subqueries {
            sub.rect.validate()?;
            match &sub.payload {
                CanvasPayload::Bitmap(bitmap) => bitmap.validate()?,
                CanvasPayload::Text(text) if text.trim().is_empty() => {
                    return Err(FrameHunterError::InvalidQuery {
                        reason: "canvas text sub-query is blank".to_string(),
                    });
                }
                CanvasPayload::Text(_) => {}
            }
        }
        Ok(())
    }
}
