// ============================================================================
// GPU MODULE   offscreen base + overlay blend renderer
// ============================================================================
//
// Architecture:
//   context.rs      capability probe, wgpu Device, Queue, adapter init
//   shaders.rs      WGSL blend shader + uniforms (inline strings)
//   texture.rs      SampledTexture wrapper with in-place upload, readback helpers
//   renderer.rs     FrameRenderer seam; GpuRenderer with its Uninitialized/Ready/Destroyed lifecycle
// ============================================================================

pub mod context;
pub mod renderer;
pub mod shaders;
pub mod texture;

pub use renderer::{FrameRenderer, GpuRenderer, RenderSurface, RendererStats};
