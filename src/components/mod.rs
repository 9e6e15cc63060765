pub mod layers_panel;
pub mod tools_panel;

pub use layers_panel::LayersPanel;
