// ============================================================================
// LAYER MODEL: ordered z-stack of segment layers + transient UI state
// ============================================================================
//
// Index 0 is the TOP of the stack: earlier in the list = rendered on top.
// Every id-taking operation silently ignores ids that are not present.

use crate::mask::SegmentMask;
use crate::palette::Rgb;

/// Stable per-session layer identity (the provider index).
pub type LayerId = u32;

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub visible: bool,
    pub color: Rgb,
    pub name: String,
    pub mask: SegmentMask,
}

impl Layer {
    pub fn new(id: LayerId, name: String, color: Rgb, mask: SegmentMask) -> Self {
        Self {
            id,
            visible: true,
            color,
            name,
            mask,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LayerModel {
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    dragged: Option<LayerId>,
    drop_target: Option<LayerId>,
}

impl LayerModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from freshly created layers; the first layer starts
    /// selected.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        let selected = layers.first().map(|l| l.id);
        Self {
            layers,
            selected,
            dragged: None,
            drop_target: None,
        }
    }

    /// Drop every layer and all transient state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Visible layers, top first.
    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visible)
    }

    pub fn visible_count(&self) -> usize {
        self.visible_layers().count()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Flip visibility.  Returns `true` if a layer changed.
    pub fn toggle_visibility(&mut self, id: LayerId) -> bool {
        match self.get_mut(id) {
            Some(layer) => {
                layer.visible = !layer.visible;
                true
            }
            None => false,
        }
    }

    /// Select a layer.  Unknown ids leave the current selection unchanged.
    pub fn select(&mut self, id: LayerId) -> bool {
        if self.contains(id) {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.and_then(|id| self.get(id))
    }

    /// Move `dragged` into the slot currently held by `target`: remove it,
    /// then insert it at `target`'s original index.  Everything else keeps
    /// its relative order.  Returns `true` if the order changed.
    pub fn reorder(&mut self, dragged: LayerId, target: LayerId) -> bool {
        if dragged == target {
            return false;
        }
        let (Some(from), Some(to)) = (self.position(dragged), self.position(target)) else {
            return false;
        };
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        true
    }

    // ------------------------------------------------------------------
    // Drag state
    // ------------------------------------------------------------------

    pub fn begin_drag(&mut self, id: LayerId) {
        if self.contains(id) {
            self.dragged = Some(id);
            self.drop_target = None;
        }
    }

    /// Track the hovered drop target (`None` clears it).  Ignored when no
    /// drag is in progress or the id is unknown.
    pub fn set_drop_target(&mut self, id: Option<LayerId>) {
        if self.dragged.is_none() {
            return;
        }
        match id {
            Some(id) if self.contains(id) => self.drop_target = Some(id),
            Some(_) => {}
            None => self.drop_target = None,
        }
    }

    pub fn end_drag(&mut self) {
        self.dragged = None;
        self.drop_target = None;
    }

    /// Complete a drag onto `target`.  Dropping a layer onto itself is a
    /// cancelled reorder.  Always ends the drag.
    pub fn drop_on(&mut self, target: LayerId) -> bool {
        let changed = match self.dragged {
            Some(dragged) => self.reorder(dragged, target),
            None => false,
        };
        self.end_drag();
        changed
    }

    pub fn dragged(&self) -> Option<LayerId> {
        self.dragged
    }

    pub fn drop_target(&self) -> Option<LayerId> {
        self.drop_target
    }
}
