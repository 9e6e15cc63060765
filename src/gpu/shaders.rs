// ============================================================================
// GPU SHADERS: WGSL kept inline
// ============================================================================

use bytemuck::{Pod, Zeroable};

use crate::compositor::{OVERLAY_STRENGTH, PRESENCE_EPSILON};

/// Uniforms for `BLEND_SHADER`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlendUniforms {
    pub overlay_strength: f32,
    pub presence_epsilon: f32,
    pub _pad: [f32; 2],
}

impl Default for BlendUniforms {
    fn default() -> Self {
        Self {
            overlay_strength: OVERLAY_STRENGTH,
            presence_epsilon: PRESENCE_EPSILON,
            _pad: [0.0; 2],
        }
    }
}

// ============================================================================
// BLEND SHADER: base image + colour-coded overlay on a full-viewport quad
// ============================================================================
//
// Overlay red below the presence epsilon means "no segment here" and the base
// shows through untouched.  Otherwise the overlay colour is mixed in at a
// fixed strength and alpha is forced to 1.  Must stay in step with
// `compositor::blend_pixel`.
pub const BLEND_SHADER: &str = r#"
struct BlendUniforms {
    overlay_strength: f32,
    presence_epsilon: f32,
    _pad0: f32,
    _pad1: f32,
};

@group(0) @binding(0) var<uniform> u: BlendUniforms;
@group(1) @binding(0) var base_tex: texture_2d<f32>;
@group(1) @binding(1) var base_samp: sampler;
@group(2) @binding(0) var overlay_tex: texture_2d<f32>;
@group(2) @binding(1) var overlay_samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    // Unit quad (0..1), two triangles
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let p = positions[vi];

    var out: VertexOutput;
    // Y flipped: uv (0,0) is the top-left texel
    out.position = vec4<f32>(p.x * 2.0 - 1.0, 1.0 - p.y * 2.0, 0.0, 1.0);
    out.uv = p;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(base_tex, base_samp, in.uv);
    let overlay = textureSample(overlay_tex, overlay_samp, in.uv);
    if (overlay.r < u.presence_epsilon) {
        return base;
    }
    return vec4<f32>(mix(base.rgb, overlay.rgb, u.overlay_strength), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<BlendUniforms>(), 16);
        let u = BlendUniforms::default();
        assert_eq!(u.overlay_strength, 0.4);
        assert_eq!(u.presence_epsilon, 0.01);
    }

    #[test]
    fn shader_declares_entry_points() {
        assert!(BLEND_SHADER.contains("fn vs_main"));
        assert!(BLEND_SHADER.contains("fn fs_main"));
    }
}
