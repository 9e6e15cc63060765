// ============================================================================
// CANVAS GEOMETRY: base image size, display fit, display→mask mapping
// ============================================================================

/// Default bound on the longer display axis, in logical pixels.
pub const MAX_DISPLAY_SIZE: u32 = 800;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasGeometry {
    pub base_width: u32,
    pub base_height: u32,
    pub display_width: u32,
    pub display_height: u32,
}

impl CanvasGeometry {
    /// Aspect-preserving scale-to-fit.  The longer axis is capped at
    /// `max_size` (never upscaled), the other axis follows the aspect ratio,
    /// and both are rounded to the nearest integer.
    pub fn fit(base_width: u32, base_height: u32, max_size: u32) -> Self {
        let w = base_width.max(1) as f64;
        let h = base_height.max(1) as f64;
        let aspect = w / h;
        let max = max_size.max(1) as f64;

        let (dw, dh) = if base_width > base_height {
            let dw = max.min(w);
            (dw, dw / aspect)
        } else {
            let dh = max.min(h);
            (dh * aspect, dh)
        };

        Self {
            base_width,
            base_height,
            display_width: (dw.round() as u32).max(1),
            display_height: (dh.round() as u32).max(1),
        }
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    /// Independent X/Y factors from display space to a bitmap of the given size.
    pub fn scale_to(&self, target_width: u32, target_height: u32) -> (f32, f32) {
        (
            target_width as f32 / self.display_width as f32,
            target_height as f32 / self.display_height as f32,
        )
    }

    /// Map a display-space point into a bitmap of the given size.
    pub fn to_mask_space(&self, x: f32, y: f32, mask_width: u32, mask_height: u32) -> (f32, f32) {
        let (sx, sy) = self.scale_to(mask_width, mask_height);
        (x * sx, y * sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_capped_on_width() {
        let g = CanvasGeometry::fit(1600, 900, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (800, 450));
    }

    #[test]
    fn portrait_and_square_cap_on_height() {
        let g = CanvasGeometry::fit(1000, 2000, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (400, 800));

        let g = CanvasGeometry::fit(1200, 1200, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (800, 800));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let g = CanvasGeometry::fit(200, 100, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (200, 100));
    }

    #[test]
    fn rounding_is_to_nearest() {
        // 1000x333 → 800 x 266.4 → 266
        let g = CanvasGeometry::fit(1000, 333, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (800, 266));
        // 1000x334 → 800 x 267.2 → 267
        let g = CanvasGeometry::fit(1000, 334, MAX_DISPLAY_SIZE);
        assert_eq!(g.display_size(), (800, 267));
    }

    #[test]
    fn display_points_map_into_mask_space() {
        let g = CanvasGeometry::fit(200, 200, MAX_DISPLAY_SIZE);
        assert_eq!(g.to_mask_space(100.0, 100.0, 100, 100), (50.0, 50.0));
        assert_eq!(g.to_mask_space(100.0, 50.0, 400, 100), (200.0, 25.0));
    }
}
