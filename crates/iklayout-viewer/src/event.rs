//! Normalised interaction events delivered by display surfaces.

use serde::{Deserialize, Serialize};

/// Mouse button as reported by the host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// One pointer interaction in surface pixel coordinates (origin top left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Press {
        x: f64,
        y: f64,
        button: MouseButton,
        double_click: bool,
    },
    Release {
        x: f64,
        y: f64,
        button: MouseButton,
    },
    Move {
        x: f64,
        y: f64,
        button: MouseButton,
    },
    Enter,
    Leave,
    Scroll {
        direction: ScrollDirection,
    },
}

impl PointerEvent {
    pub fn press(x: f64, y: f64) -> Self {
        PointerEvent::Press {
            x,
            y,
            button: MouseButton::Left,
            double_click: false,
        }
    }

    pub fn double_click(x: f64, y: f64) -> Self {
        PointerEvent::Press {
            x,
            y,
            button: MouseButton::Left,
            double_click: true,
        }
    }

    pub fn release(x: f64, y: f64) -> Self {
        PointerEvent::Release {
            x,
            y,
            button: MouseButton::Left,
        }
    }

    pub fn moved(x: f64, y: f64) -> Self {
        PointerEvent::Move {
            x,
            y,
            button: MouseButton::Left,
        }
    }

    pub fn scroll(direction: ScrollDirection) -> Self {
        PointerEvent::Scroll { direction }
    }

    /// Surface coordinates, absent for enter/leave/scroll.
    pub fn position(&self) -> Option<(f64, f64)> {
        match *self {
            PointerEvent::Press { x, y, .. }
            | PointerEvent::Release { x, y, .. }
            | PointerEvent::Move { x, y, .. } => Some((x, y)),
            PointerEvent::Enter | PointerEvent::Leave | PointerEvent::Scroll { .. } => None,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self, PointerEvent::Release { .. })
    }
}

/// On-canvas buttons of surfaces that carry chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromeButton {
    ZoomIn,
    ZoomOut,
    Reset,
}

/// Everything a display surface reports back to the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    Pointer(PointerEvent),
    Button(ChromeButton),
}

impl From<PointerEvent> for SurfaceEvent {
    fn from(event: PointerEvent) -> Self {
        SurfaceEvent::Pointer(event)
    }
}
