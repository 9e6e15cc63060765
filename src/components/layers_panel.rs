use eframe::egui;
use egui::{Color32, Rect, Sense, Stroke, Vec2};

use segmentfe::layers::LayerId;
use segmentfe::Session;

const ROW_HEIGHT: f32 = 26.0;
const SWATCH_SIZE: f32 = 14.0;

/// Row interactions, applied after the list is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LayerAction {
    ToggleVisibility(LayerId),
    Select(LayerId),
    BeginDrag(LayerId),
    DropTarget(Option<LayerId>),
    Drop,
}

/// Layer list: visibility, colour swatch, name/selection, drag to reorder.
/// Index 0 is drawn first and is the top of the stack.
#[derive(Default)]
pub struct LayersPanel;

impl LayersPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, session: &mut Session) {
        ui.heading("Segments");
        ui.add_space(4.0);

        if session.model().is_empty() {
            ui.weak("No segments yet");
            return;
        }

        let mut actions: Vec<LayerAction> = Vec::new();
        let model = session.model();
        let dragging = model.dragged();
        let pointer = ui.ctx().pointer_interact_pos();
        let mut hovered_row: Option<LayerId> = None;

        let accent = ui.visuals().selection.bg_fill;

        for layer in model.layers() {
            let id = layer.id;
            let selected = model.selected() == Some(id);

            let row = ui
                .horizontal(|ui| {
                    ui.set_min_height(ROW_HEIGHT);

                    let handle = ui
                        .add(egui::Label::new("☰").sense(Sense::click_and_drag()))
                        .on_hover_cursor(egui::CursorIcon::Grab);
                    if handle.drag_started() {
                        actions.push(LayerAction::BeginDrag(id));
                    }
                    if handle.drag_released() {
                        actions.push(LayerAction::Drop);
                    }

                    let mut visible = layer.visible;
                    if ui.checkbox(&mut visible, "").on_hover_text("Show / hide").changed() {
                        actions.push(LayerAction::ToggleVisibility(id));
                    }

                    let (swatch, _) = ui.allocate_exact_size(Vec2::splat(SWATCH_SIZE), Sense::hover());
                    let [r, g, b] = layer.color;
                    ui.painter().rect_filled(swatch, 2.0, Color32::from_rgb(r, g, b));

                    if ui.selectable_label(selected, layer.name.as_str()).clicked() {
                        actions.push(LayerAction::Select(id));
                    }
                })
                .response;

            let row_rect: Rect = row.rect;
            if dragging.is_some() && pointer.is_some_and(|p| row_rect.contains(p)) {
                hovered_row = Some(id);
            }
            if dragging == Some(id) {
                ui.painter()
                    .rect_filled(row_rect, 3.0, accent.gamma_multiply(0.25));
            }
            if model.drop_target() == Some(id) && dragging != Some(id) {
                ui.painter().rect_stroke(row_rect, 3.0, Stroke::new(2.0, accent));
            }
        }

        if dragging.is_some() {
            actions.push(LayerAction::DropTarget(hovered_row));
            ui.ctx().request_repaint();
        }

        for action in actions {
            match action {
                LayerAction::ToggleVisibility(id) => session.toggle_visibility(id),
                LayerAction::Select(id) => session.select(id),
                LayerAction::BeginDrag(id) => session.begin_drag(id),
                LayerAction::DropTarget(target) => session.set_drop_target(target),
                LayerAction::Drop => match session.model().drop_target() {
                    Some(target) => session.drop_on(target),
                    None => session.end_drag(),
                },
            }
        }
    }
}
