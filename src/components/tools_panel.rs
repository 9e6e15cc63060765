use eframe::egui;

use segmentfe::brush::Tool;
use segmentfe::Session;

/// Pencil / eraser and brush size.
pub fn show(ui: &mut egui::Ui, session: &mut Session) {
    ui.heading("Tools");
    ui.horizontal(|ui| {
        for &tool in Tool::all() {
            if ui.selectable_label(session.tool() == tool, tool.label()).clicked() {
                session.set_tool(tool);
            }
        }
    });

    let mut size = session.brush_size();
    if ui
        .add(egui::Slider::new(&mut size, 1..=100).text("Brush size"))
        .changed()
    {
        session.set_brush_size(size);
    }

    let target = session
        .model()
        .selected_layer()
        .map(|l| l.name.as_str())
        .unwrap_or("none");
    ui.weak(format!("Editing: {}", target));
}
