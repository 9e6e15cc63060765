// ============================================================================
// SegmentFE GUI: upload, layer list, tools, canvas
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2};

use segmentfe::error::RenderError;
use segmentfe::export::{default_export_root, ZipSink, ARCHIVE_NAME};
use segmentfe::provider::{mime_for_path, DirectoryProvider, SegmentationWorker};
use segmentfe::session::SessionStatus;
use segmentfe::settings::AppSettings;
use segmentfe::{log_err, log_info, Session};

use crate::components::{tools_panel, LayersPanel};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

pub struct SegmentFEApp {
    settings: AppSettings,
    session: Session,
    worker: SegmentationWorker,
    layers_panel: LayersPanel,

    upload_path: Option<PathBuf>,
    canvas_texture: Option<TextureHandle>,
    /// (generation, overlay revision) the texture was built from.
    canvas_key: Option<(u64, u64)>,
    /// Last export result or I/O problem, shown under the buttons.
    notice: Option<String>,
}

impl SegmentFEApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: AppSettings) -> Self {
        let worker = SegmentationWorker::new(Arc::new(DirectoryProvider::new(settings.masks_dir.clone())));
        Self {
            session: Session::new(settings.clone()),
            settings,
            worker,
            layers_panel: LayersPanel,
            upload_path: None,
            canvas_texture: None,
            canvas_key: None,
            notice: None,
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn upload(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.notice = Some(format!("Could not read {}: {}", path.display(), e));
                return;
            }
        };

        // Masks come from the configured folder, or `masks/` next to the image.
        let masks = if self.settings.masks_dir.is_empty() {
            path.parent()
                .map(|p| p.join("masks").to_string_lossy().into_owned())
                .unwrap_or_else(|| "masks".to_string())
        } else {
            self.settings.masks_dir.clone()
        };
        self.worker.set_provider(Arc::new(DirectoryProvider::new(masks)));

        self.notice = None;
        self.canvas_key = None;
        match self.session.begin_upload(bytes, mime_for_path(&path)) {
            Ok(ticket) => {
                self.worker.submit(ticket);
                self.upload_path = Some(path);
            }
            Err(_) => {
                self.upload_path = None;
                self.canvas_texture = None;
            }
        }
    }

    fn choose_masks_dir(&mut self) {
        if let Some(dir) = rfd::FileDialog::new().pick_folder() {
            self.settings.masks_dir = dir.to_string_lossy().into_owned();
            self.settings.save();
            log_info!("Mask folder set to {}", self.settings.masks_dir);
        }
    }

    fn export(&mut self) {
        let start = default_export_root(self.upload_path.as_deref());
        let Some(path) = rfd::FileDialog::new()
            .set_directory(&start)
            .set_file_name(ARCHIVE_NAME)
            .add_filter("Zip archive", &["zip"])
            .save_file()
        else {
            return;
        };
        let mut sink = ZipSink::new(path);
        self.notice = Some(match self.session.export(&mut sink) {
            Ok(n) => format!("Exported {} segments to {}", n, sink.path().display()),
            Err(e) => {
                log_err!("Export failed: {}", e);
                format!("Export failed: {}", e)
            }
        });
    }

    fn reset(&mut self) {
        self.session.reset();
        self.upload_path = None;
        self.canvas_texture = None;
        self.canvas_key = None;
        self.notice = None;
    }

    // ------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------

    fn show_side_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("side_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    if ui.button("Upload…").clicked() {
                        self.upload();
                    }
                    let can_export = self.session.model().visible_count() > 0;
                    if ui.add_enabled(can_export, egui::Button::new("Export…")).clicked() {
                        self.export();
                    }
                    if ui.button("Reset").clicked() {
                        self.reset();
                    }
                });
                if ui
                    .small_button("Mask folder…")
                    .on_hover_text(if self.settings.masks_dir.is_empty() {
                        "Using masks/ next to the image"
                    } else {
                        self.settings.masks_dir.as_str()
                    })
                    .clicked()
                {
                    self.choose_masks_dir();
                }

                ui.add_space(4.0);
                self.show_status(ui);
                if let Some(notice) = &self.notice {
                    ui.label(notice.as_str());
                }

                self.show_image_info(ui);

                ui.separator();
                tools_panel::show(ui, &mut self.session);
                ui.separator();

                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.layers_panel.show(ui, &mut self.session);
                });

                ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
                    self.show_debug_line(ui);
                });
            });
    }

    fn show_status(&self, ui: &mut egui::Ui) {
        match self.session.status() {
            SessionStatus::Idle => {
                ui.weak("Upload an image to begin");
            }
            SessionStatus::Processing => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Segmenting with '{}'…", self.worker.provider_name()));
                });
            }
            SessionStatus::Ready => {
                ui.label(format!("{} segments", self.session.model().len()));
            }
            SessionStatus::Empty { message, .. } => {
                ui.colored_label(Color32::from_rgb(220, 160, 40), message.as_str());
            }
            SessionStatus::Failed { message } => {
                ui.colored_label(Color32::from_rgb(220, 60, 60), message.as_str());
            }
        }
    }

    fn show_image_info(&self, ui: &mut egui::Ui) {
        let Some(info) = self.session.image_info() else {
            return;
        };
        egui::Grid::new("image_info").num_columns(2).show(ui, |ui| {
            ui.weak("Original");
            ui.label(format!("{} × {}", info.original.0, info.original.1));
            ui.end_row();
            ui.weak("Display");
            ui.label(format!("{} × {}", info.display.0, info.display.1));
            ui.end_row();
            ui.weak("Layers");
            ui.label(info.layers.to_string());
            ui.end_row();
        });
    }

    fn show_debug_line(&self, ui: &mut egui::Ui) {
        let text = match (self.session.adapter_name(), self.session.renderer_stats()) {
            (Some(adapter), Some(stats)) => format!(
                "GPU: {} | draws {} | uploads {} | reallocs {}",
                adapter, stats.draws, stats.overlay_uploads, stats.overlay_reallocations
            ),
            _ => "GPU: off (CPU preview)".to_string(),
        };
        ui.weak(text);
    }

    fn show_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(geometry) = self.session.geometry() else {
                ui.centered_and_justified(|ui| {
                    ui.weak("No image");
                });
                return;
            };

            if let Some(err) = self.session.render_error() {
                if err.is_fatal_for_session() {
                    ui.weak("GPU preview requires a capable environment; showing CPU preview.");
                } else if let RenderError::Resource(_) = err {
                    ui.colored_label(Color32::from_rgb(220, 60, 60), err.to_string());
                }
            }

            self.refresh_canvas_texture(ctx);

            let (dw, dh) = geometry.display_size();
            let size = Vec2::new(dw as f32, dh as f32);
            let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

            if let Some(tex) = &self.canvas_texture {
                let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                ui.painter().image(tex.id(), rect, uv, Color32::WHITE);
            } else {
                ui.painter().rect_filled(rect, 0.0, Color32::from_gray(30));
            }

            self.handle_pointer(ui, rect, &response);
            self.draw_brush_cursor(ui, rect, &response);
        });
    }

    /// Brush input in display coordinates.  Leaving the canvas ends the
    /// stroke.
    fn handle_pointer(&mut self, ui: &egui::Ui, rect: Rect, response: &egui::Response) {
        if self.session.status() != &SessionStatus::Ready {
            return;
        }
        let (pressed, down, pos) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.interact_pos(),
            )
        });
        let inside = pos.filter(|p| rect.contains(*p));

        match inside {
            Some(p) if pressed && response.hovered() => {
                let local = p - rect.min;
                self.session.pointer_down(local.x, local.y);
            }
            Some(p) if down && self.session.is_drawing() => {
                let local = p - rect.min;
                self.session.pointer_move(local.x, local.y);
            }
            _ => {}
        }
        if self.session.is_drawing() && (!down || inside.is_none()) {
            self.session.pointer_up();
        }
    }

    /// Outline of the brush footprint under the pointer.
    fn draw_brush_cursor(&self, ui: &egui::Ui, rect: Rect, response: &egui::Response) {
        if self.session.status() != &SessionStatus::Ready {
            return;
        }
        let Some(pos) = response.hover_pos() else {
            return;
        };
        let painter = ui.painter().with_clip_rect(rect);
        let radius = self.session.cursor_radius();
        painter.circle_stroke(pos, radius, Stroke::new(1.0, Color32::BLACK));
        painter.circle_stroke(pos, radius + 1.0, Stroke::new(1.0, Color32::WHITE));
        ui.ctx().set_cursor_icon(egui::CursorIcon::None);
    }

    fn refresh_canvas_texture(&mut self, ctx: &egui::Context) {
        self.session.flush_overlay();
        let key = (self.session.generation(), self.session.overlay_revision());
        if self.canvas_key == Some(key) && self.canvas_texture.is_some() {
            return;
        }
        let Some(frame) = self.session.frame() else {
            return;
        };
        let image = ColorImage::from_rgba_unmultiplied(
            [frame.width() as usize, frame.height() as usize],
            frame.as_raw(),
        );
        match &mut self.canvas_texture {
            Some(tex) => tex.set(image, TextureOptions::LINEAR),
            None => {
                self.canvas_texture = Some(ctx.load_texture("segment_canvas", image, TextureOptions::LINEAR));
            }
        }
        self.canvas_key = Some(key);
    }
}

impl eframe::App for SegmentFEApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Some(response) = self.worker.poll() {
            self.session.apply_segmentation(response, Instant::now());
            self.canvas_key = None;
        }
        if self.session.tick(Instant::now()) {
            self.upload_path = None;
            self.canvas_texture = None;
            self.canvas_key = None;
        }

        match self.session.status() {
            SessionStatus::Processing | SessionStatus::Empty { .. } => {
                ctx.request_repaint_after(Duration::from_millis(100));
            }
            _ => {}
        }

        self.show_side_panel(ctx);
        self.show_canvas(ctx);
    }
}
