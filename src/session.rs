// ============================================================================
// SESSION: upload → layers → edits → overlay → renderer, on the UI thread
// ============================================================================
//
// Every layer or mask mutation bumps `overlay_revision`.  `flush_overlay`
// recomputes the composite for the newest revision only and pushes it to the
// renderer synchronously, so an older overlay can never land on top of a
// newer one.  Pointer handlers flush before returning.
//
// Each upload gets a fresh generation; provider responses stamped with any
// other generation are dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::brush::{BrushEditor, MaskRect, Tool};
use crate::compositor::{blend_preview, composite};
use crate::error::{ExportError, RenderError};
use crate::export::{export_to, ExportSink};
use crate::geometry::CanvasGeometry;
use crate::gpu::{FrameRenderer, GpuRenderer, RenderSurface, RendererStats};
use crate::layers::{LayerId, LayerModel};
use crate::mask::build_layers;
use crate::provider::{SegmentationResponse, UploadTicket};
use crate::settings::AppSettings;
use crate::{log_err, log_info, log_warn};

#[derive(Clone, Debug, PartialEq)]
pub enum SessionStatus {
    /// Nothing uploaded.
    Idle,
    /// Waiting for the provider.
    Processing,
    Ready,
    /// No objects found; resets itself at `reset_at`.
    Empty { message: String, reset_at: Instant },
    /// Provider failure; stays until the next upload or reset.
    Failed { message: String },
}

impl SessionStatus {
    pub fn message(&self) -> Option<&str> {
        match self {
            SessionStatus::Empty { message, .. } | SessionStatus::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Sizes shown in the image info panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub original: (u32, u32),
    pub display: (u32, u32),
    pub layers: usize,
}

/// Builds a renderer for the preferred adapter name.
pub type RendererFactory = Box<dyn Fn(&str) -> Box<dyn FrameRenderer>>;

/// What to do with the renderer after it reported an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderRecovery {
    /// Build a fresh renderer and try again.
    Reinitialize,
    /// Keep the CPU preview and record the error.
    Persist,
}

/// Resource errors get one re-initialisation per upload; everything else,
/// and any second Resource error, is persistent.
pub fn recovery_for(error: &RenderError, reinit_attempted: bool) -> RenderRecovery {
    match error {
        RenderError::Resource(_) if !reinit_attempted => RenderRecovery::Reinitialize,
        _ => RenderRecovery::Persist,
    }
}

pub struct Session {
    settings: AppSettings,
    generation: u64,
    status: SessionStatus,

    base: Option<RgbaImage>,
    geometry: Option<CanvasGeometry>,
    model: LayerModel,

    brush: BrushEditor,
    tool: Tool,
    brush_size: u32,

    overlay: Option<RgbaImage>,
    overlay_revision: u64,
    flushed_revision: u64,

    renderer: Option<Box<dyn FrameRenderer>>,
    make_renderer: RendererFactory,
    /// Persistent renderer failure; fatal kinds survive resets.
    render_error: Option<RenderError>,
    reinit_attempted: bool,
}

impl Session {
    pub fn new(settings: AppSettings) -> Self {
        Self::with_renderer_factory(
            settings,
            Box::new(|gpu: &str| -> Box<dyn FrameRenderer> { Box::new(GpuRenderer::new(gpu)) }),
        )
    }

    pub fn with_renderer_factory(settings: AppSettings, make_renderer: RendererFactory) -> Self {
        let brush = BrushEditor::new(settings.connect_eraser_strokes);
        let brush_size = settings.default_brush_size.clamp(1, 100);
        Self {
            settings,
            generation: 0,
            status: SessionStatus::Idle,
            base: None,
            geometry: None,
            model: LayerModel::new(),
            brush,
            tool: Tool::Pencil,
            brush_size,
            overlay: None,
            overlay_revision: 0,
            flushed_revision: 0,
            renderer: None,
            make_renderer,
            render_error: None,
            reinit_attempted: false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model(&self) -> &LayerModel {
        &self.model
    }

    pub fn base(&self) -> Option<&RgbaImage> {
        self.base.as_ref()
    }

    pub fn geometry(&self) -> Option<CanvasGeometry> {
        self.geometry
    }

    pub fn overlay(&self) -> Option<&RgbaImage> {
        self.overlay.as_ref()
    }

    pub fn overlay_revision(&self) -> u64 {
        self.overlay_revision
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.clamp(1, 100);
    }

    /// Brush outline radius in display pixels.
    pub fn cursor_radius(&self) -> f32 {
        self.brush_size as f32 / 2.0
    }

    pub fn image_info(&self) -> Option<ImageInfo> {
        let g = self.geometry?;
        Some(ImageInfo {
            original: (g.base_width, g.base_height),
            display: g.display_size(),
            layers: self.model.len(),
        })
    }

    pub fn is_drawing(&self) -> bool {
        self.brush.is_drawing()
    }

    pub fn render_error(&self) -> Option<&RenderError> {
        self.render_error.as_ref()
    }

    pub fn gpu_active(&self) -> bool {
        self.renderer.as_ref().is_some_and(|r| r.is_ready())
    }

    pub fn renderer_stats(&self) -> Option<RendererStats> {
        self.renderer.as_ref().map(|r| r.stats())
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.renderer.as_ref().and_then(|r| r.adapter_name())
    }

    // ------------------------------------------------------------------
    // Upload / provider response
    // ------------------------------------------------------------------

    /// Start a new upload: decode the base image, drop all previous state
    /// and hand back the ticket for the provider call.
    pub fn begin_upload(&mut self, bytes: Vec<u8>, mime: &str) -> Result<UploadTicket, image::ImageError> {
        self.clear_upload_state();
        self.generation += 1;

        let base = match image::load_from_memory(&bytes) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                log_err!("Upload #{} could not be decoded: {}", self.generation, e);
                self.status = SessionStatus::Failed {
                    message: format!("Could not read image: {}", e),
                };
                return Err(e);
            }
        };

        let geometry = CanvasGeometry::fit(base.width(), base.height(), self.settings.max_display_size);
        log_info!(
            "Upload #{}: {}x{} shown at {}x{}",
            self.generation,
            base.width(),
            base.height(),
            geometry.display_width,
            geometry.display_height
        );
        self.base = Some(base);
        self.geometry = Some(geometry);
        self.status = SessionStatus::Processing;
        self.start_renderer();

        Ok(UploadTicket {
            generation: self.generation,
            bytes: Arc::new(bytes),
            mime: mime.to_string(),
        })
    }

    /// Apply a provider response.  Returns `false` when it belongs to an
    /// older upload (or arrived after a reset) and was dropped.
    pub fn apply_segmentation(&mut self, response: SegmentationResponse, now: Instant) -> bool {
        if response.generation != self.generation || self.status != SessionStatus::Processing {
            log_warn!(
                "Discarding stale segmentation response #{} (current #{})",
                response.generation,
                self.generation
            );
            return false;
        }

        let outcome = response.result.and_then(|masks| build_layers(&masks));
        match outcome {
            Ok(layers) => {
                log_info!("Segmentation #{} produced {} layers", response.generation, layers.len());
                self.model = LayerModel::from_layers(layers);
                self.status = SessionStatus::Ready;
                self.mark_overlay_dirty();
                self.flush_overlay();
            }
            Err(e) if e.is_recoverable() => {
                log_info!("Segmentation #{}: {}", response.generation, e);
                let delay = Duration::from_secs(self.settings.empty_reset_secs);
                self.status = SessionStatus::Empty {
                    message: e.to_string(),
                    reset_at: now + delay,
                };
            }
            Err(e) => {
                log_err!("Segmentation #{} failed: {}", response.generation, e);
                self.status = SessionStatus::Failed { message: e.to_string() };
            }
        }
        true
    }

    /// Drive the empty-result auto-reset.  Returns `true` if it fired.
    pub fn tick(&mut self, now: Instant) -> bool {
        let due = matches!(&self.status, SessionStatus::Empty { reset_at, .. } if now >= *reset_at);
        if due {
            self.reset();
        }
        due
    }

    /// Back to the pre-upload state.  In-flight responses become stale.
    pub fn reset(&mut self) {
        self.clear_upload_state();
        self.generation += 1;
        self.status = SessionStatus::Idle;
        log_info!("Session reset (generation #{})", self.generation);
    }

    fn clear_upload_state(&mut self) {
        self.destroy_renderer();
        if self.render_error.as_ref().is_some_and(|e| !e.is_fatal_for_session()) {
            self.render_error = None;
        }
        self.reinit_attempted = false;
        self.base = None;
        self.geometry = None;
        self.model.clear();
        self.brush.end_stroke();
        self.overlay = None;
        self.overlay_revision += 1;
        self.flushed_revision = self.overlay_revision;
    }

    // ------------------------------------------------------------------
    // Layer operations (unknown ids are ignored)
    // ------------------------------------------------------------------

    pub fn toggle_visibility(&mut self, id: LayerId) {
        if self.model.toggle_visibility(id) {
            self.mark_overlay_dirty();
            self.flush_overlay();
        }
    }

    pub fn select(&mut self, id: LayerId) {
        self.model.select(id);
    }

    pub fn reorder(&mut self, dragged: LayerId, target: LayerId) {
        if self.model.reorder(dragged, target) {
            self.mark_overlay_dirty();
            self.flush_overlay();
        }
    }

    pub fn begin_drag(&mut self, id: LayerId) {
        self.model.begin_drag(id);
    }

    pub fn set_drop_target(&mut self, id: Option<LayerId>) {
        self.model.set_drop_target(id);
    }

    pub fn drop_on(&mut self, target: LayerId) {
        if self.model.drop_on(target) {
            self.mark_overlay_dirty();
            self.flush_overlay();
        }
    }

    pub fn end_drag(&mut self) {
        self.model.end_drag();
    }

    // ------------------------------------------------------------------
    // Brush (display-space pointer events on the selected layer)
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Option<MaskRect> {
        let geometry = self.geometry?;
        let selected = self.model.selected();
        let rect = self.brush.begin_stroke(
            &mut self.model,
            selected,
            &geometry,
            x,
            y,
            self.tool,
            self.brush_size as f32,
        );
        self.after_edit(rect)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<MaskRect> {
        let geometry = self.geometry?;
        let selected = self.model.selected();
        let rect = self.brush.continue_stroke(
            &mut self.model,
            selected,
            &geometry,
            x,
            y,
            self.tool,
            self.brush_size as f32,
        );
        self.after_edit(rect)
    }

    /// Pointer released or left the canvas.
    pub fn pointer_up(&mut self) {
        self.brush.end_stroke();
    }

    fn after_edit(&mut self, rect: Option<MaskRect>) -> Option<MaskRect> {
        if rect.is_some() {
            self.mark_overlay_dirty();
            self.flush_overlay();
        }
        rect
    }

    // ------------------------------------------------------------------
    // Overlay + renderer
    // ------------------------------------------------------------------

    pub fn mark_overlay_dirty(&mut self) {
        self.overlay_revision += 1;
    }

    /// Recompute the composite for the newest revision and push it to the
    /// renderer.  Returns `false` when nothing was pending.
    pub fn flush_overlay(&mut self) -> bool {
        if self.flushed_revision == self.overlay_revision {
            return false;
        }
        self.overlay = composite(&self.model);
        self.flushed_revision = self.overlay_revision;

        let result = match self.renderer.as_mut() {
            Some(renderer) => renderer.update_overlay(self.overlay.as_ref()).map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.on_render_error(e);
        }
        true
    }

    /// Current display frame: the GPU frame when the renderer is up,
    /// otherwise the CPU preview.  `None` before an upload.
    pub fn frame(&mut self) -> Option<RgbaImage> {
        self.flush_overlay();
        if let Some(renderer) = self.renderer.as_mut() {
            match renderer.read_frame() {
                Ok(frame) => return Some(frame),
                Err(e) => self.on_render_error(e),
            }
        }
        self.preview()
    }

    /// CPU rendition of the blended display image.
    pub fn preview(&self) -> Option<RgbaImage> {
        let base = self.base.as_ref()?;
        let geometry = self.geometry?;
        Some(blend_preview(base, self.overlay.as_ref(), &geometry))
    }

    fn start_renderer(&mut self) {
        self.destroy_renderer();
        if self.render_error.as_ref().is_some_and(|e| e.is_fatal_for_session()) {
            return;
        }
        if self.settings.gpu_disabled() {
            let e = RenderError::Unsupported("GPU acceleration is turned off".into());
            log_info!("{}", e);
            self.render_error = Some(e);
            return;
        }
        let (Some(base), Some(geometry)) = (self.base.as_ref(), self.geometry) else {
            return;
        };
        let surface = RenderSurface {
            width: geometry.display_width,
            height: geometry.display_height,
        };

        loop {
            let mut renderer = (self.make_renderer)(&self.settings.preferred_gpu);
            let e = match renderer.initialize(surface, base, self.overlay.as_ref()) {
                Ok(()) => {
                    self.renderer = Some(renderer);
                    self.render_error = None;
                    return;
                }
                Err(e) => e,
            };
            match recovery_for(&e, self.reinit_attempted) {
                RenderRecovery::Reinitialize => {
                    log_warn!("Renderer initialisation failed ({}), retrying once", e);
                    self.reinit_attempted = true;
                }
                RenderRecovery::Persist => {
                    log_err!("Renderer unavailable: {}", e);
                    self.render_error = Some(e);
                    return;
                }
            }
        }
    }

    fn on_render_error(&mut self, e: RenderError) {
        log_err!("Renderer error: {}", e);
        match recovery_for(&e, self.reinit_attempted) {
            RenderRecovery::Reinitialize => {
                self.reinit_attempted = true;
                self.start_renderer();
            }
            RenderRecovery::Persist => {
                self.destroy_renderer();
                self.render_error = Some(e);
            }
        }
    }

    fn destroy_renderer(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.destroy();
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn export(&self, sink: &mut dyn ExportSink) -> Result<usize, ExportError> {
        let base = self.base.as_ref().ok_or(ExportError::NothingToExport)?;
        export_to(&self.model, base, sink)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy_renderer();
    }
}
