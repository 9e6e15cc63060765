// ============================================================================
// SegmentFE   segmentation mask viewer / editor
// ============================================================================
//
// Data flow:
//   provider     opaque `bytes → mask PNGs` boundary + background worker
//   mask         decoded per-segment bitmaps (MaskStore)
//   layers       ordered z-stack, visibility, selection, drag state
//   brush        pencil / eraser edits in mask space
//   compositor   visible layers → one colour-coded RGBA overlay
//   gpu          base + overlay blend on the GPU
//   session      ties the above together on the UI thread
//   export       per-segment transparent cutouts
// ============================================================================

pub mod logger;

pub mod brush;
pub mod cli;
pub mod compositor;
pub mod error;
pub mod export;
pub mod geometry;
pub mod gpu;
pub mod layers;
pub mod mask;
pub mod palette;
pub mod provider;
pub mod session;
pub mod settings;

pub use error::{ExportError, RenderError, SegmentError};
pub use layers::{Layer, LayerId, LayerModel};
pub use session::Session;
