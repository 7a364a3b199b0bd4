//! Frame generation for geotagged photo timelapses.
//!
//! Photos and location-history samples are aligned in time, a map region is
//! chosen for every photo and one PNG frame per photo is written for each
//! preset. Basemaps come from a [`session::TileSource`] and are reused across
//! frames by a [`session::MapSession`] whenever the loaded tiles still cover
//! the requested region.

use thiserror::Error;

pub mod canvas;
pub mod extract;
pub mod extras;
pub mod loader;
pub mod mercator;
pub mod pipeline;
pub mod region;
pub mod series;
pub mod session;

pub use loader::{load_location_history, load_photos, locations_from_photos};
pub use pipeline::{MapAnimator, MapPreset, RunRange};
pub use region::BoundingBox;
pub use series::{LocationSample, PhotoRecord, TimeSeries};
pub use session::{Basemap, MapSession, SessionConfig, TileRequest, TileSource};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Failed to parse data: {0}")]
    ParseError(String),

    #[error("Timestamps not chronologically ordered, check: {}", filenames.join(", "))]
    DataIntegrity { filenames: Vec<String> },

    #[error("Invalid frame range: {0}")]
    InvalidRange(String),

    #[error("No samples in {0} series")]
    EmptySeries(&'static str),

    #[error("Failed to load font: {0}")]
    FontError(String),

    #[error("Tile backend failed: {0}")]
    TileError(String),
}

pub type StatusOr<T> = Result<T, FrameError>;
