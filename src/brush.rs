// ============================================================================
// BRUSH EDITOR: pointer samples → mask edits on the selected layer
// ============================================================================
//
// Pointer coordinates arrive in display space and are rescaled to the
// target mask with independent X/Y factors.  The brush size is a diameter
// in display pixels, scaled by the smaller factor so the stamp stays round.
//
// Coverage is hard-edged: a mask pixel is inside a shape when its centre is.

use crate::geometry::CanvasGeometry;
use crate::layers::{LayerId, LayerModel};
use crate::mask::{FULL_INTENSITY, SegmentMask};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Pencil,
    Eraser,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pencil => "Pencil",
            Tool::Eraser => "Eraser",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Pencil, Tool::Eraser]
    }

    fn value(&self) -> u8 {
        match self {
            Tool::Pencil => FULL_INTENSITY,
            Tool::Eraser => 0,
        }
    }
}

/// Smallest stamp radius in mask pixels; guarantees the pixel under the
/// pointer is always covered.
const MIN_RADIUS: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Mask-space rectangle `[x0, x1) × [y0, y1)` touched by an edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl MaskRect {
    pub fn union(self, other: MaskRect) -> MaskRect {
        MaskRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Continuous-stroke state: whether the pointer is down and where the
/// previous sample was (display space).
#[derive(Clone, Debug, Default)]
pub struct BrushEditor {
    drawing: bool,
    last: Option<(f32, f32)>,
    /// When set, the eraser also joins consecutive samples with a capsule,
    /// like the pencil does.  Off by default.
    pub connect_eraser: bool,
}

impl BrushEditor {
    pub fn new(connect_eraser: bool) -> Self {
        Self {
            drawing: false,
            last: None,
            connect_eraser,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Pointer down.  Stamps once; no connecting line on the first sample.
    /// Nothing happens (and no stroke starts) without a resolvable layer.
    pub fn begin_stroke(
        &mut self,
        model: &mut LayerModel,
        layer_id: Option<LayerId>,
        geometry: &CanvasGeometry,
        x: f32,
        y: f32,
        tool: Tool,
        brush_size: f32,
    ) -> Option<MaskRect> {
        self.last = None;
        self.drawing = layer_id.is_some_and(|id| model.contains(id));
        if !self.drawing {
            return None;
        }
        let rect = self.apply(model, layer_id, geometry, x, y, tool, brush_size);
        self.last = Some((x, y));
        rect
    }

    /// Pointer move while down.
    pub fn continue_stroke(
        &mut self,
        model: &mut LayerModel,
        layer_id: Option<LayerId>,
        geometry: &CanvasGeometry,
        x: f32,
        y: f32,
        tool: Tool,
        brush_size: f32,
    ) -> Option<MaskRect> {
        if !self.drawing {
            return None;
        }
        let rect = self.apply(model, layer_id, geometry, x, y, tool, brush_size);
        self.last = Some((x, y));
        rect
    }

    /// Pointer up or left the canvas.
    pub fn end_stroke(&mut self) {
        self.drawing = false;
        self.last = None;
    }

    /// Apply one brush sample at display point `(x, y)`.
    ///
    /// Returns `None` when `layer_id` is absent or unknown, or when the stamp
    /// misses the mask entirely.
    pub fn apply(
        &self,
        model: &mut LayerModel,
        layer_id: Option<LayerId>,
        geometry: &CanvasGeometry,
        x: f32,
        y: f32,
        tool: Tool,
        brush_size: f32,
    ) -> Option<MaskRect> {
        let layer = model.get_mut(layer_id?)?;
        let mask = &mut layer.mask;
        let (sx, sy) = geometry.scale_to(mask.width(), mask.height());
        let cx = x * sx;
        let cy = y * sy;
        let radius = (brush_size * sx.min(sy) / 2.0).max(MIN_RADIUS);
        let value = tool.value();

        let mut touched = stamp_circle(mask, cx, cy, radius, value);

        let connect = match tool {
            Tool::Pencil => true,
            Tool::Eraser => self.connect_eraser,
        };
        if connect {
            if let Some((px, py)) = self.last {
                let segment = stamp_capsule(mask, (px * sx, py * sy), (cx, cy), radius, value);
                touched = match (touched, segment) {
                    (Some(a), Some(b)) => Some(a.union(b)),
                    (a, b) => a.or(b),
                };
            }
        }
        touched
    }
}

/// Clamp the float box `[min, max]` to pixel indices of the mask.
fn pixel_bounds(mask: &SegmentMask, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Option<MaskRect> {
    let (w, h) = mask.dimensions();
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(w);
    let y1 = (max_y.ceil().max(0.0) as u32).min(h);
    if x0 >= x1 || y0 >= y1 {
        None
    } else {
        Some(MaskRect { x0, y0, x1, y1 })
    }
}

/// Filled circle.  Returns the clamped bounding box that was scanned.
pub fn stamp_circle(mask: &mut SegmentMask, cx: f32, cy: f32, radius: f32, value: u8) -> Option<MaskRect> {
    let rect = pixel_bounds(mask, cx - radius, cy - radius, cx + radius, cy + radius)?;
    let r2 = radius * radius;
    for py in rect.y0..rect.y1 {
        let dy = py as f32 + 0.5 - cy;
        for px in rect.x0..rect.x1 {
            let dx = px as f32 + 0.5 - cx;
            if dx * dx + dy * dy <= r2 {
                mask.set(px, py, value);
            }
        }
    }
    Some(rect)
}

/// Round-capped line of half-width `radius` from `a` to `b`.
pub fn stamp_capsule(mask: &mut SegmentMask, a: (f32, f32), b: (f32, f32), radius: f32, value: u8) -> Option<MaskRect> {
    let rect = pixel_bounds(
        mask,
        a.0.min(b.0) - radius,
        a.1.min(b.1) - radius,
        a.0.max(b.0) + radius,
        a.1.max(b.1) + radius,
    )?;
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len2 = abx * abx + aby * aby;
    let r2 = radius * radius;
    for py in rect.y0..rect.y1 {
        let qy = py as f32 + 0.5;
        for px in rect.x0..rect.x1 {
            let qx = px as f32 + 0.5;
            let t = if len2 > 0.0 {
                (((qx - a.0) * abx + (qy - a.1) * aby) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let dx = qx - (a.0 + t * abx);
            let dy = qy - (a.1 + t * aby);
            if dx * dx + dy * dy <= r2 {
                mask.set(px, py, value);
            }
        }
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Layer;
    use crate::palette::color_for_index;

    fn model(n: u32, w: u32, h: u32) -> LayerModel {
        LayerModel::from_layers(
            (0..n)
                .map(|i| Layer::new(i, format!("Segment {}", i + 1), color_for_index(i as usize), SegmentMask::new(w, h)))
                .collect(),
        )
    }

    fn members(m: &LayerModel, id: LayerId) -> Vec<(u32, u32)> {
        let mask = &m.get(id).unwrap().mask;
        let mut out = Vec::new();
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                if mask.is_member(x, y) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn display_point_is_rescaled_into_mask_space() {
        let mut m = model(3, 100, 100);
        let g = CanvasGeometry::fit(200, 200, 800);
        let brush = BrushEditor::default();
        let rect = brush.apply(&mut m, Some(1), &g, 100.0, 100.0, Tool::Pencil, 20.0);
        assert!(rect.is_some());

        let painted = members(&m, 1);
        assert!(!painted.is_empty());
        assert!(painted.contains(&(50, 50)));
        for (x, y) in painted {
            let dx = x as f32 + 0.5 - 50.0;
            let dy = y as f32 + 0.5 - 50.0;
            assert!((dx * dx + dy * dy).sqrt() <= 10.0, "({x},{y}) outside radius");
        }
        assert!(members(&m, 0).is_empty());
        assert!(members(&m, 2).is_empty());
    }

    #[test]
    fn non_uniform_scaling_keeps_brush_round() {
        let mut m = model(1, 400, 100);
        let g = CanvasGeometry::fit(200, 200, 800);
        BrushEditor::default().apply(&mut m, Some(0), &g, 100.0, 100.0, Tool::Pencil, 20.0);
        // x scale 2, y scale 0.5 → radius uses 0.5 → 5 px around (200, 50)
        let painted = members(&m, 0);
        let xs: Vec<u32> = painted.iter().map(|p| p.0).collect();
        let ys: Vec<u32> = painted.iter().map(|p| p.1).collect();
        let width = xs.iter().max().unwrap() - xs.iter().min().unwrap() + 1;
        let height = ys.iter().max().unwrap() - ys.iter().min().unwrap() + 1;
        assert_eq!(width, height);
        assert!(painted.contains(&(200, 50)));
    }

    #[test]
    fn paint_then_erase_restores_zero() {
        let mut m = model(1, 64, 64);
        let g = CanvasGeometry::fit(64, 64, 800);
        let brush = BrushEditor::default();
        brush.apply(&mut m, Some(0), &g, 30.0, 30.0, Tool::Pencil, 12.0);
        assert!(!members(&m, 0).is_empty());
        brush.apply(&mut m, Some(0), &g, 30.0, 30.0, Tool::Eraser, 12.0);
        assert!(m.get(0).unwrap().mask.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn missing_or_unknown_layer_is_a_noop() {
        let mut m = model(1, 8, 8);
        let g = CanvasGeometry::fit(8, 8, 800);
        let mut brush = BrushEditor::default();
        assert!(brush.apply(&mut m, None, &g, 4.0, 4.0, Tool::Pencil, 4.0).is_none());
        assert!(brush.apply(&mut m, Some(9), &g, 4.0, 4.0, Tool::Pencil, 4.0).is_none());
        assert!(brush.begin_stroke(&mut m, None, &g, 4.0, 4.0, Tool::Pencil, 4.0).is_none());
        assert!(!brush.is_drawing());
        assert!(brush.continue_stroke(&mut m, Some(0), &g, 4.0, 4.0, Tool::Pencil, 4.0).is_none());
        assert!(members(&m, 0).is_empty());
    }

    #[test]
    fn pencil_stroke_connects_samples() {
        let mut m = model(1, 100, 20);
        let g = CanvasGeometry::fit(100, 20, 800);
        let mut brush = BrushEditor::default();
        brush.begin_stroke(&mut m, Some(0), &g, 10.0, 10.0, Tool::Pencil, 4.0);
        brush.continue_stroke(&mut m, Some(0), &g, 90.0, 10.0, Tool::Pencil, 4.0);
        brush.end_stroke();
        let mask = &m.get(0).unwrap().mask;
        for x in 10..90 {
            assert!(mask.is_member(x, 10), "gap at x={x}");
        }
    }

    #[test]
    fn eraser_only_stamps_unless_connected() {
        let g = CanvasGeometry::fit(100, 20, 800);

        let mut m = model(1, 100, 20);
        stamp_circle(&mut m.get_mut(0).unwrap().mask, 50.0, 10.0, 60.0, 255);
        let mut brush = BrushEditor::default();
        brush.begin_stroke(&mut m, Some(0), &g, 10.0, 10.0, Tool::Eraser, 4.0);
        brush.continue_stroke(&mut m, Some(0), &g, 90.0, 10.0, Tool::Eraser, 4.0);
        assert!(m.get(0).unwrap().mask.is_member(50, 10));
        assert!(!m.get(0).unwrap().mask.is_member(10, 10));

        let mut m = model(1, 100, 20);
        stamp_circle(&mut m.get_mut(0).unwrap().mask, 50.0, 10.0, 60.0, 255);
        let mut brush = BrushEditor::new(true);
        brush.begin_stroke(&mut m, Some(0), &g, 10.0, 10.0, Tool::Eraser, 4.0);
        brush.continue_stroke(&mut m, Some(0), &g, 90.0, 10.0, Tool::Eraser, 4.0);
        assert!(!m.get(0).unwrap().mask.is_member(50, 10));
    }

    #[test]
    fn stroke_end_forgets_previous_sample() {
        let mut m = model(1, 100, 20);
        let g = CanvasGeometry::fit(100, 20, 800);
        let mut brush = BrushEditor::default();
        brush.begin_stroke(&mut m, Some(0), &g, 10.0, 10.0, Tool::Pencil, 4.0);
        brush.end_stroke();
        brush.begin_stroke(&mut m, Some(0), &g, 90.0, 10.0, Tool::Pencil, 4.0);
        assert!(!m.get(0).unwrap().mask.is_member(50, 10));
    }

    #[test]
    fn stamps_clip_at_mask_edges() {
        let mut mask = SegmentMask::new(10, 10);
        let rect = stamp_circle(&mut mask, 0.0, 0.0, 3.0, 255).unwrap();
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (0, 0, 3, 3));
        assert!(stamp_circle(&mut mask, -20.0, -20.0, 3.0, 255).is_none());
    }
}
