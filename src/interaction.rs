//! Dispatch of raw pointer events onto the grid, the audio engine and the spectrum plot.

use crate::audio_engine::AudioGridEngine;
use crate::grid::GridLayout;
use crate::spectrum_sync::{SpectrumPlot, SpectrumSync};

/// Pointer events in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Enter,
    Leave,
}

/// Routes pointer events. All state lives in the engine; the controller only dispatches.
///
/// Positions outside the grid are dropped silently. The spectrum follows the pointer whether
/// or not it is pressed, audio only changes while pressed. Enter and leave cues are played by
/// the session, not here.
pub struct InteractionController<P> {
    layout: GridLayout,
    engine: AudioGridEngine,
    spectrum: SpectrumSync<P>,
}

impl<P: SpectrumPlot> InteractionController<P> {
    pub fn new(layout: GridLayout, engine: AudioGridEngine, spectrum: SpectrumSync<P>) -> Self {
        Self {
            layout,
            engine,
            spectrum,
        }
    }

    pub fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down { x, y } => {
                let Ok(index) = self.layout.index_at(x, y) else {
                    return;
                };
                self.spectrum.show(index);
                self.engine.press(index);
            }
            PointerEvent::Move { x, y } => {
                let Ok(index) = self.layout.index_at(x, y) else {
                    return;
                };
                self.spectrum.show(index);
                self.engine.drag_to(index);
            }
            PointerEvent::Up | PointerEvent::Leave => self.engine.release(),
            PointerEvent::Enter => {}
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn engine(&self) -> &AudioGridEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioGridEngine {
        &mut self.engine
    }

    pub fn spectrum(&self) -> &SpectrumSync<P> {
        &self.spectrum
    }
}
