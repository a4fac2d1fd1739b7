use serde::Serialize;

use crate::cells::CellInfo;

/// Approximate advance of one label character, in pixels.
const CHAR_WIDTH: f64 = 7.0;
const LINE_HEIGHT: f64 = 16.0;
const PADDING: f64 = 6.0;

/// Rectangle plus label describing the selected cell, anchored at a fixed
/// canvas position (top left, pixels).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub lines: Vec<String>,
}

impl InfoBox {
    /// Box for `cell`, sized to fit its label.
    pub fn for_cell(cell: &CellInfo, anchor: [f64; 2]) -> Self {
        let mut lines = vec![cell.name.clone(), format!("id: {}", cell.id)];
        if let Some(bbox) = cell.bbox {
            lines.push(format!(
                "({:.3}, {:.3}) - ({:.3}, {:.3})",
                bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y
            ));
        }
        if cell.is_top {
            lines.push("top cell".to_string());
        }

        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        Self {
            x: anchor[0],
            y: anchor[1],
            width: longest as f64 * CHAR_WIDTH + 2.0 * PADDING,
            height: lines.len() as f64 * LINE_HEIGHT + 2.0 * PADDING,
            lines,
        }
    }

    /// Where the label is centred.
    pub fn label_center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn label(&self) -> String {
        self.lines.join("\n")
    }
}

/// Identifies an overlay drawn on a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OverlayHandle(pub u64);
