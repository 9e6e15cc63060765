// ============================================================================
// SEGMENT PALETTE: fixed per-layer display colours
// ============================================================================

pub type Rgb = [u8; 3];

/// Colour assigned to layer `i` at creation is `SEGMENT_PALETTE[i % 12]`.
pub const SEGMENT_PALETTE: [Rgb; 12] = [
    [51, 255, 51],   // Green
    [255, 51, 51],   // Red
    [51, 102, 255],  // Blue
    [255, 255, 51],  // Yellow
    [255, 51, 255],  // Magenta
    [51, 255, 255],  // Cyan
    [255, 153, 51],  // Orange
    [153, 51, 255],  // Purple
    [51, 255, 153],  // Spring Green
    [255, 204, 51],  // Gold
    [204, 51, 153],  // Pink
    [102, 204, 255], // Light Blue
];

/// Creation-time colour for the layer at provider index `index`.
pub fn color_for_index(index: usize) -> Rgb {
    SEGMENT_PALETTE[index % SEGMENT_PALETTE.len()]
}

/// Id-derived colour used by older overlay encodings, which stored a
/// per-segment value `((id + 1) * 37) % 255 + 1` and mapped it back onto the
/// palette.  Must stay bit-exact with that encoding; new code reads
/// `Layer::color` instead.
pub fn legacy_render_color(id: u32) -> Rgb {
    let segment_value = ((id as u64 + 1) * 37) % 255 + 1;
    let index = ((segment_value as f64 / 255.0) * SEGMENT_PALETTE.len() as f64).floor() as usize;
    SEGMENT_PALETTE.get(index).copied().unwrap_or(SEGMENT_PALETTE[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_colors_wrap_modulo_palette() {
        assert_eq!(color_for_index(0), [51, 255, 51]);
        assert_eq!(color_for_index(11), [102, 204, 255]);
        assert_eq!(color_for_index(12), color_for_index(0));
        assert_eq!(color_for_index(25), color_for_index(1));
    }

    #[test]
    fn legacy_colors_match_encoding() {
        // id 0 → value 38 → floor(1.78) = 1 (red)
        assert_eq!(legacy_render_color(0), SEGMENT_PALETTE[1]);
        // id 5 → value 223 → floor(10.49) = 10 (pink)
        assert_eq!(legacy_render_color(5), SEGMENT_PALETTE[10]);
        // id 6 → 259 % 255 = 4 → value 5 → index 0
        assert_eq!(legacy_render_color(6), SEGMENT_PALETTE[0]);
    }

    #[test]
    fn legacy_value_255_falls_back_to_first_entry() {
        // value 255 maps to index 12, one past the end.
        let id = (0u32..2000)
            .find(|id| ((*id as u64 + 1) * 37) % 255 + 1 == 255)
            .expect("some id encodes to 255");
        assert_eq!(legacy_render_color(id), SEGMENT_PALETTE[0]);
    }
}
