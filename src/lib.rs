//! Sonification engine for hyperspectral image listening.
//!
//! An N×N grid of cells, one pre-rendered looping clip per cell. Pressing on a cell fades its
//! clip in, dragging crossfades to the cell under the pointer and releasing fades out. Hovering
//! only updates the spectrum plot of the cell under the pointer.
//!
//! [`session::Session`] is the entry point; it owns the [`interaction::InteractionController`],
//! which dispatches pointer events to the [`audio_engine::AudioGridEngine`] and the
//! [`spectrum_sync::SpectrumSync`].

pub mod audio_engine;
pub mod grid;
pub mod interaction;
pub mod messages;
pub mod session;
pub mod spectrum_sync;
pub mod tables;

pub use audio_engine::audio_stream::{OutputFormat, setup_logger};
pub use audio_engine::errors::{ClipLoadError, EngineError};
pub use audio_engine::{AudioGridEngine, GainSettings};
pub use grid::{CellCoord, CellIndex, GridLayout, OutOfBounds};
pub use interaction::PointerEvent;
pub use session::{OutputMode, Session, SessionConfig, SessionState};
pub use spectrum_sync::SpectrumPlot;
pub use tables::TableError;
