use thiserror::Error;

use iklayout_io::GdsError;
use iklayout_renderer::RenderError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ViewerError {
    /// The design could not be materialised to a transfer file.
    #[error("Failed to write transfer file: {0}")]
    Transfer(#[source] GdsError),

    /// The renderer could not open the layout.
    #[error(transparent)]
    Load(RenderError),

    #[error("Failed to capture raster: {0}")]
    Capture(#[source] RenderError),

    #[error("Failed to decode raster: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode frame for the display: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Display surface events were already subscribed")]
    AlreadySubscribed,

    #[error("Display surface is closed")]
    SurfaceClosed,

    #[error("Invalid widget message: {0}")]
    Message(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
