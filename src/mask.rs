// ============================================================================
// MASK STORE: per-segment membership bitmaps + layer creation
// ============================================================================
//
// A mask is a single-channel bitmap: intensity above MEMBERSHIP_THRESHOLD
// means "this pixel belongs to the segment".  Each layer owns its mask
// exclusively and only the brush mutates it.

use image::{GrayImage, Luma, RgbaImage};

use crate::error::SegmentError;
use crate::layers::Layer;
use crate::palette;
use crate::{log_info, log_warn};

/// Intensities strictly above this value are segment members.
pub const MEMBERSHIP_THRESHOLD: u8 = 128;

/// Full-intensity value written by the pencil.
pub const FULL_INTENSITY: u8 = 255;

/// An owned, independently mutable membership bitmap.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentMask {
    pixels: GrayImage,
}

impl SegmentMask {
    /// All-zero mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    /// Copy the red channel of `src` into a fresh `width × height` surface,
    /// anchored at the origin.  Parts of `src` outside the surface are
    /// cropped; parts of the surface not covered by `src` stay zero.
    pub fn from_red_channel(src: &RgbaImage, width: u32, height: u32) -> Self {
        let mut pixels = GrayImage::new(width, height);
        let cw = width.min(src.width());
        let ch = height.min(src.height());
        for y in 0..ch {
            for x in 0..cw {
                let r = src.get_pixel(x, y).0[0];
                pixels.put_pixel(x, y, Luma([r]));
            }
        }
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Intensity at `(x, y)`; out-of-bounds reads are 0.
    #[inline]
    pub fn intensity(&self, x: u32, y: u32) -> u8 {
        if x < self.pixels.width() && y < self.pixels.height() {
            self.pixels.get_pixel(x, y).0[0]
        } else {
            0
        }
    }

    #[inline]
    pub fn is_member(&self, x: u32, y: u32) -> bool {
        self.intensity(x, y) > MEMBERSHIP_THRESHOLD
    }

    /// Out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.pixels.width() && y < self.pixels.height() {
            self.pixels.put_pixel(x, y, Luma([value]));
        }
    }

    /// Number of member pixels.
    pub fn member_count(&self) -> usize {
        self.pixels
            .as_raw()
            .iter()
            .filter(|&&v| v > MEMBERSHIP_THRESHOLD)
            .count()
    }

    /// Raw row-major intensities.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

/// Decode provider mask rasters into layers, one per mask, in input order.
///
/// * Empty input → `SegmentError::EmptyResult`.
/// * The first mask defines the surface size for every layer; if it cannot
///   be decoded the payload is malformed (`SegmentError::Provider`).
/// * A later mask that fails to decode is skipped; ids stay equal to the
///   provider index so colours and names keep their positions.
pub fn build_layers(masks: &[Vec<u8>]) -> Result<Vec<Layer>, SegmentError> {
    let Some(first) = masks.first() else {
        return Err(SegmentError::empty());
    };

    let first_img = image::load_from_memory(first)
        .map_err(|e| SegmentError::Provider(format!("mask 1 could not be decoded: {}", e)))?
        .to_rgba8();
    let (width, height) = first_img.dimensions();

    let mut layers = Vec::with_capacity(masks.len());
    layers.push(make_layer(0, SegmentMask::from_red_channel(&first_img, width, height)));

    for (index, bytes) in masks.iter().enumerate().skip(1) {
        match image::load_from_memory(bytes) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                if rgba.dimensions() != (width, height) {
                    log_warn!(
                        "mask {} is {}x{}, expected {}x{}; copying at origin",
                        index + 1,
                        rgba.width(),
                        rgba.height(),
                        width,
                        height
                    );
                }
                layers.push(make_layer(index, SegmentMask::from_red_channel(&rgba, width, height)));
            }
            Err(e) => {
                log_warn!("Failed to process mask {}: {}", index + 1, e);
            }
        }
    }

    log_info!("Created {} layers ({}x{}) from {} masks", layers.len(), width, height, masks.len());
    Ok(layers)
}

fn make_layer(index: usize, mask: SegmentMask) -> Layer {
    Layer::new(
        index as u32,
        format!("Segment {}", index + 1),
        palette::color_for_index(index),
        mask,
    )
}
