//! Mapping of normalised pointer events onto renderer calls.
//!
//! The mapping is stateless. Every button is reported to the renderer as the
//! left button; right and middle button semantics are not implemented.

use serde::{Deserialize, Serialize};

use iklayout_core::geometry::Point;
use iklayout_renderer::{ButtonState, LayoutRenderer};

use crate::event::{PointerEvent, ScrollDirection};

/// What to do with a press that carries the double-click flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleClickPolicy {
    /// Send it as a double-click event.
    Forward,
    /// Ignore it entirely.
    Drop,
}

/// Outcome of translating one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Forwarded,
    Dropped,
    /// Scrolls are not forwarded; the caller turns them into zoom steps.
    Zoom(ScrollDirection),
}

pub fn forward_event<R: LayoutRenderer + ?Sized>(
    renderer: &mut R,
    event: &PointerEvent,
    double_click: DoubleClickPolicy,
) -> Dispatch {
    let buttons = ButtonState::LeftButton;
    match *event {
        PointerEvent::Press {
            x,
            y,
            double_click: true,
            ..
        } => match double_click {
            DoubleClickPolicy::Forward => {
                renderer.send_mouse_double_clicked_event(Point::new(x, y), buttons)
            }
            DoubleClickPolicy::Drop => return Dispatch::Dropped,
        },
        PointerEvent::Press { x, y, .. } => renderer.send_mouse_press_event(Point::new(x, y), buttons),
        PointerEvent::Release { x, y, .. } => {
            renderer.send_mouse_release_event(Point::new(x, y), buttons)
        }
        PointerEvent::Move { x, y, .. } => renderer.send_mouse_move_event(Point::new(x, y), buttons),
        PointerEvent::Enter => renderer.send_enter_event(),
        PointerEvent::Leave => renderer.send_leave_event(),
        PointerEvent::Scroll { direction } => return Dispatch::Zoom(direction),
    }
    Dispatch::Forwarded
}
