// ============================================================================
// COMPOSITOR: visible layers → one colour-coded RGBA overlay
// ============================================================================
//
// Semantics: start from opaque black at the first visible layer's mask size,
// then draw every visible layer bottom-up (reverse list order) as a hard
// cutout of its colour, each one overwriting what is below wherever it
// claims a pixel.  The net result per pixel is simply the colour of the
// FIRST visible layer in list order that claims it, which is what the row
// loop below computes directly.  No colour mixing between segments.
//
// Always a full recompute; the provider caps the layer count at 12.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::geometry::CanvasGeometry;
use crate::layers::{Layer, LayerModel};

/// Fixed overlay mix factor used by the blend shader.
pub const OVERLAY_STRENGTH: f32 = 0.4;

/// Overlay pixels whose normalised red channel is below this are "empty".
pub const PRESENCE_EPSILON: f32 = 0.01;

/// Colour of overlay pixels no visible layer claims.
pub const UNCLAIMED: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Build the composite overlay.  `None` when no layer is visible, meaning
/// "no overlay to render".
pub fn composite(model: &LayerModel) -> Option<RgbaImage> {
    let visible: Vec<&Layer> = model.visible_layers().collect();
    let first = visible.first()?;
    let (width, height) = first.mask.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let row_bytes = width as usize * 4;
    let mut buf = vec![0u8; row_bytes * height as usize];

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                let owner = visible.iter().find(|l| l.mask.is_member(x, y));
                match owner {
                    Some(layer) => {
                        px[0] = layer.color[0];
                        px[1] = layer.color[1];
                        px[2] = layer.color[2];
                        px[3] = 255;
                    }
                    None => px.copy_from_slice(&UNCLAIMED.0),
                }
            }
        });

    RgbaImage::from_raw(width, height, buf)
}

/// CPU mirror of the GPU blend shader, rendered at display size.
///
/// Both images are sampled (nearest) at the same normalised coordinate.  An
/// overlay pixel with red below `PRESENCE_EPSILON` leaves the base pixel
/// untouched; otherwise the output is `mix(base, overlay, 0.4)` with alpha 1.
pub fn blend_preview(base: &RgbaImage, overlay: Option<&RgbaImage>, geometry: &CanvasGeometry) -> RgbaImage {
    let (dw, dh) = geometry.display_size();
    let row_bytes = dw as usize * 4;
    let mut buf = vec![0u8; row_bytes * dh as usize];

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let v = (y as f32 + 0.5) / dh as f32;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let u = (x as f32 + 0.5) / dw as f32;
                let b = sample_nearest(base, u, v);
                let out = match overlay {
                    Some(ov) => {
                        let o = sample_nearest(ov, u, v);
                        blend_pixel(b, o)
                    }
                    None => b,
                };
                px.copy_from_slice(&out.0);
            }
        });

    RgbaImage::from_raw(dw, dh, buf).unwrap_or_else(|| RgbaImage::new(dw, dh))
}

/// Per-pixel blend rule shared with `shaders::BLEND_SHADER`.
#[inline]
pub fn blend_pixel(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    if (overlay.0[0] as f32 / 255.0) < PRESENCE_EPSILON {
        return base;
    }
    let mix = |b: u8, o: u8| -> u8 {
        let b = b as f32 / 255.0;
        let o = o as f32 / 255.0;
        ((b + (o - b) * OVERLAY_STRENGTH) * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(base.0[0], overlay.0[0]),
        mix(base.0[1], overlay.0[1]),
        mix(base.0[2], overlay.0[2]),
        255,
    ])
}

#[inline]
fn sample_nearest(img: &RgbaImage, u: f32, v: f32) -> Rgba<u8> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let x = ((u * w as f32) as u32).min(w - 1);
    let y = ((v * h as f32) as u32).min(h - 1);
    *img.get_pixel(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::SegmentMask;
    use crate::palette::color_for_index;

    fn layer(id: u32, w: u32, h: u32, pixels: &[(u32, u32)]) -> Layer {
        let mut mask = SegmentMask::new(w, h);
        for &(x, y) in pixels {
            mask.set(x, y, 255);
        }
        Layer::new(id, format!("Segment {}", id + 1), color_for_index(id as usize), mask)
    }

    /// Literal bottom-up draw-over with per-layer scratch images.
    fn reference_composite(model: &LayerModel) -> Option<RgbaImage> {
        let visible: Vec<&Layer> = model.visible_layers().collect();
        let (w, h) = visible.first()?.mask.dimensions();
        let mut out = RgbaImage::from_pixel(w, h, UNCLAIMED);
        for l in visible.iter().rev() {
            let scratch = RgbaImage::from_fn(w, h, |x, y| {
                if l.mask.is_member(x, y) {
                    Rgba([l.color[0], l.color[1], l.color[2], 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            });
            // "draw over": opaque source pixels replace the destination
            for (dst, src) in out.pixels_mut().zip(scratch.pixels()) {
                if src.0[3] != 0 {
                    *dst = *src;
                }
            }
        }
        Some(out)
    }

    #[test]
    fn nothing_visible_means_no_overlay() {
        let mut m = LayerModel::from_layers(vec![layer(0, 4, 4, &[(0, 0)])]);
        m.toggle_visibility(0);
        assert!(composite(&m).is_none());
        assert!(composite(&LayerModel::new()).is_none());
    }

    #[test]
    fn earlier_layer_wins_overlap() {
        let a = layer(0, 4, 4, &[(1, 1), (2, 2)]);
        let b = layer(1, 4, 4, &[(1, 1), (3, 3)]);
        let c = layer(2, 4, 4, &[(1, 1)]);
        let m = LayerModel::from_layers(vec![a, b, c]);
        let out = composite(&m).unwrap();

        let a_col = color_for_index(0);
        let b_col = color_for_index(1);
        assert_eq!(out.get_pixel(1, 1).0, [a_col[0], a_col[1], a_col[2], 255]);
        assert_eq!(out.get_pixel(3, 3).0, [b_col[0], b_col[1], b_col[2], 255]);
        assert_eq!(*out.get_pixel(0, 3), UNCLAIMED);
    }

    #[test]
    fn reorder_and_visibility_change_ownership() {
        let a = layer(0, 2, 2, &[(0, 0)]);
        let b = layer(1, 2, 2, &[(0, 0)]);
        let mut m = LayerModel::from_layers(vec![a, b]);
        m.reorder(1, 0);
        let b_col = color_for_index(1);
        assert_eq!(&composite(&m).unwrap().get_pixel(0, 0).0[..3], &b_col);

        m.toggle_visibility(1);
        let a_col = color_for_index(0);
        assert_eq!(&composite(&m).unwrap().get_pixel(0, 0).0[..3], &a_col);
    }

    #[test]
    fn matches_bottom_up_draw_over_and_is_deterministic() {
        let a = layer(0, 6, 5, &[(0, 0), (1, 1), (2, 2), (5, 4)]);
        let b = layer(1, 6, 5, &[(1, 1), (2, 2), (3, 3)]);
        let c = layer(2, 6, 5, &[(2, 2), (3, 3), (4, 4), (0, 4)]);
        let mut m = LayerModel::from_layers(vec![a, b, c]);
        m.toggle_visibility(1);

        let first = composite(&m).unwrap();
        let second = composite(&m).unwrap();
        assert_eq!(first, second);
        assert_eq!(Some(first), reference_composite(&m));
    }

    #[test]
    fn size_follows_first_visible_layer() {
        let a = layer(0, 3, 3, &[]);
        let b = layer(1, 5, 2, &[(4, 1)]);
        let mut m = LayerModel::from_layers(vec![a, b]);
        m.toggle_visibility(0);
        assert_eq!(composite(&m).unwrap().dimensions(), (5, 2));
    }

    #[test]
    fn blend_rule_matches_shader() {
        let base = Rgba([100, 100, 100, 200]);
        assert_eq!(blend_pixel(base, UNCLAIMED), base);
        // red 2/255 < 0.01 still counts as empty
        assert_eq!(blend_pixel(base, Rgba([2, 255, 255, 255])), base);

        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 51, 255]));
        assert_eq!(out.0, [102, 102, 20, 255]);
    }

    #[test]
    fn preview_is_display_sized() {
        let base = RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 255]));
        let overlay = RgbaImage::from_pixel(5, 5, Rgba([255, 51, 51, 255]));
        let g = CanvasGeometry::fit(20, 10, 8);
        let out = blend_preview(&base, Some(&overlay), &g);
        assert_eq!(out.dimensions(), (8, 4));
        assert_eq!(*out.get_pixel(0, 0), blend_pixel(Rgba([10, 20, 30, 255]), Rgba([255, 51, 51, 255])));

        let plain = blend_preview(&base, None, &g);
        assert_eq!(*plain.get_pixel(7, 3), Rgba([10, 20, 30, 255]));
    }
}
