use serde::{Deserialize, Serialize};

/// A unique layer identifier (the GDS layer number).
pub type LayerId = u32;

/// Represents a technology layer in the layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub gds_layer: u16,
    pub gds_datatype: u16,
    pub color: LayerColor,
    pub fill_pattern: FillPattern,
    pub opacity: f32,
    pub visible: bool,
}

impl Layer {
    pub fn new(id: LayerId, name: &str, gds_layer: u16, gds_datatype: u16) -> Self {
        Self {
            id,
            name: name.to_string(),
            gds_layer,
            gds_datatype,
            color: LayerColor::default(),
            fill_pattern: FillPattern::Solid,
            opacity: 0.7,
            visible: true,
        }
    }

    /// A layer entry synthesised for geometry whose layer is not in the stack.
    pub fn generated(id: LayerId, ordinal: usize) -> Self {
        let (r, g, b) = PALETTE[ordinal % PALETTE.len()];
        let pattern = PATTERNS[(ordinal / PALETTE.len()) % PATTERNS.len()];
        Self::new(id, &format!("{id}/0"), id as u16, 0)
            .with_color(r, g, b)
            .with_pattern(pattern)
    }

    pub fn with_color(mut self, r: u8, g: u8, b: u8) -> Self {
        self.color = LayerColor { r, g, b };
        self
    }

    pub fn with_pattern(mut self, pattern: FillPattern) -> Self {
        self.fill_pattern = pattern;
        self
    }
}

const PALETTE: [(u8, u8, u8); 8] = [
    (255, 128, 168),
    (192, 128, 255),
    (150, 128, 255),
    (128, 168, 255),
    (128, 255, 255),
    (128, 255, 128),
    (255, 255, 128),
    (255, 160, 64),
];

const PATTERNS: [FillPattern; 3] = [
    FillPattern::Hatched,
    FillPattern::CrossHatched,
    FillPattern::Dotted,
];

/// RGB color for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for LayerColor {
    fn default() -> Self {
        Self {
            r: 128,
            g: 128,
            b: 128,
        }
    }
}

impl LayerColor {
    pub fn to_rgba(self, opacity: f32) -> [u8; 4] {
        let a = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }
}

/// Fill pattern for layer rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPattern {
    Solid,
    Hatched,
    CrossHatched,
    Dotted,
    Outline,
}

impl FillPattern {
    /// Whether the pixel at screen position `(x, y)` is inked by this pattern.
    /// Outlines are drawn separately, so their interior is never inked.
    pub fn covers(self, x: u32, y: u32) -> bool {
        match self {
            FillPattern::Solid => true,
            FillPattern::Hatched => (x + y) % 4 == 0,
            FillPattern::CrossHatched => (x + y) % 4 == 0 || (x + 4 - y % 4) % 4 == 0,
            FillPattern::Dotted => x % 3 == 0 && y % 3 == 0,
            FillPattern::Outline => false,
        }
    }
}

/// A collection of layers representing a technology stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn get_layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visible)
    }

    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Add a generated entry for each id in `used` that has none yet.
    /// Returns how many layers were added.
    pub fn add_missing<I: IntoIterator<Item = LayerId>>(&mut self, used: I) -> usize {
        let mut added = 0;
        for id in used {
            if self.get_layer(id).is_none() {
                let ordinal = self.layers.len();
                self.layers.push(Layer::generated(id, ordinal));
                added += 1;
            }
        }
        added
    }

    pub fn toggle_visibility(&mut self, id: LayerId) {
        if let Some(layer) = self.get_layer_mut(id) {
            layer.visible = !layer.visible;
        }
    }
}
