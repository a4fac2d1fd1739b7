//! Reactive web widget: JSON pointer messages in, figure updates out.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::adapter::Raster;
use crate::error::ViewerError;
use crate::event::{MouseButton, PointerEvent, ScrollDirection, SurfaceEvent};
use crate::translate::DoubleClickPolicy;

use super::{send, DisplaySurface, EventChannel};

/// Pointer message posted by the frontend. Coordinates are pixels relative
/// to the image, origin top left.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WidgetMessage {
    Mousedown {
        x: f64,
        y: f64,
        #[serde(default)]
        button: u8,
        /// Click count; 2 or more is a double click.
        #[serde(default)]
        detail: u32,
    },
    Mouseup {
        x: f64,
        y: f64,
        #[serde(default)]
        button: u8,
    },
    Mousemove {
        x: f64,
        y: f64,
    },
    Mouseenter,
    Mouseleave,
    Wheel {
        #[serde(rename = "deltaY")]
        delta_y: f64,
    },
}

fn dom_button(button: u8) -> MouseButton {
    match button {
        1 => MouseButton::Middle,
        2 => MouseButton::Right,
        _ => MouseButton::Left,
    }
}

impl WidgetMessage {
    pub fn to_pointer(&self) -> Option<PointerEvent> {
        match *self {
            WidgetMessage::Mousedown { x, y, button, detail } => Some(PointerEvent::Press {
                x,
                y,
                button: dom_button(button),
                double_click: detail >= 2,
            }),
            WidgetMessage::Mouseup { x, y, button } => Some(PointerEvent::Release {
                x,
                y,
                button: dom_button(button),
            }),
            WidgetMessage::Mousemove { x, y } => Some(PointerEvent::moved(x, y)),
            WidgetMessage::Mouseenter => Some(PointerEvent::Enter),
            WidgetMessage::Mouseleave => Some(PointerEvent::Leave),
            // DOM wheel deltas are negative when scrolling up.
            WidgetMessage::Wheel { delta_y } if delta_y < 0.0 => {
                Some(PointerEvent::scroll(ScrollDirection::Up))
            }
            WidgetMessage::Wheel { delta_y } if delta_y > 0.0 => {
                Some(PointerEvent::scroll(ScrollDirection::Down))
            }
            WidgetMessage::Wheel { .. } => None,
        }
    }
}

/// Image layer update sent to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "figure_update")]
pub struct FigureUpdate {
    /// `data:image/png;base64,...`
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// Host-side handle receiving frontend messages.
#[derive(Debug, Clone)]
pub struct WidgetEvents {
    tx: UnboundedSender<SurfaceEvent>,
}

impl WidgetEvents {
    pub fn handle_message(&self, json: &str) -> Result<(), ViewerError> {
        let message: WidgetMessage = serde_json::from_str(json)?;
        match message.to_pointer() {
            Some(pointer) => send(&self.tx, SurfaceEvent::Pointer(pointer)),
            None => Ok(()),
        }
    }
}

pub struct ReactiveWidget {
    width: u32,
    height: u32,
    double_click: DoubleClickPolicy,
    events: EventChannel,
    updates_tx: UnboundedSender<String>,
    updates_rx: Option<UnboundedReceiver<String>>,
}

impl ReactiveWidget {
    pub fn new(width: u32, height: u32) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            width,
            height,
            double_click: DoubleClickPolicy::Drop,
            events: EventChannel::new(),
            updates_tx,
            updates_rx: Some(updates_rx),
        }
    }

    pub fn with_double_click(mut self, policy: DoubleClickPolicy) -> Self {
        self.double_click = policy;
        self
    }

    pub fn connect(&self) -> WidgetEvents {
        WidgetEvents {
            tx: self.events.sender(),
        }
    }

    /// Serialised [`FigureUpdate`] messages for the frontend.
    pub fn take_updates(&mut self) -> Option<UnboundedReceiver<String>> {
        self.updates_rx.take()
    }
}

impl DisplaySurface for ReactiveWidget {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn present(&mut self, raster: &Raster) -> Result<(), ViewerError> {
        let mut png = Vec::new();
        raster
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(ViewerError::Encode)?;
        let update = FigureUpdate {
            source: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            width: raster.width(),
            height: raster.height(),
        };
        let json = serde_json::to_string(&update)?;
        if self.updates_tx.send(json).is_err() {
            log::warn!("Widget frontend is gone, dropping frame");
        }
        Ok(())
    }

    fn subscribe(&mut self) -> Option<UnboundedReceiver<SurfaceEvent>> {
        self.events.take()
    }

    fn double_click_policy(&self) -> DoubleClickPolicy {
        self.double_click
    }
}
