// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::Sink;
use crate::sequencer::{TriggerEvent, TriggerObserver};
use crate::synth::Voice;

/// How long a marker stays up before the canvas is cleared.
pub const CLEAR_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Square { size: f32 },
    Triangle { size: f32 },
}

/// A position on the canvas, normalized to [0, 1] on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// What gets drawn for a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub color: Color,
    pub shape: Shape,
    pub position: Position,
}

/// Each voice has a fixed marker, laid out left to right.
pub fn marker_for(voice: Voice) -> Marker {
    match voice {
        Voice::Kick => Marker {
            color: Color::rgb(0xe0, 0x3c, 0x31),
            shape: Shape::Circle { radius: 0.12 },
            position: Position { x: 0.2, y: 0.5 },
        },
        Voice::Snare => Marker {
            color: Color::rgb(0x2d, 0x7d, 0xd2),
            shape: Shape::Square { size: 0.2 },
            position: Position { x: 0.5, y: 0.5 },
        },
        Voice::HiHat => Marker {
            color: Color::rgb(0xf2, 0xc1, 0x2e),
            shape: Shape::Triangle { size: 0.2 },
            position: Position { x: 0.8, y: 0.5 },
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas unavailable: {0}")]
    Unavailable(String),

    #[error("drawing failed: {0}")]
    Draw(String),
}

/// A drawing surface.
pub trait Canvas: Send + Sync {
    fn fill_shape(&self, color: Color, shape: Shape, position: Position)
        -> Result<(), CanvasError>;

    fn clear(&self) -> Result<(), CanvasError>;
}

/// A canvas that logs draw calls instead of drawing them.
#[derive(Debug, Default)]
pub struct TracingCanvas {}

impl TracingCanvas {
    pub fn new() -> TracingCanvas {
        TracingCanvas {}
    }
}

impl Canvas for TracingCanvas {
    fn fill_shape(
        &self,
        color: Color,
        shape: Shape,
        position: Position,
    ) -> Result<(), CanvasError> {
        info!(
            %color,
            shape = ?shape,
            x = position.x,
            y = position.y,
            "Fill shape"
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), CanvasError> {
        debug!("Clear canvas");
        Ok(())
    }
}

/// Draws a marker for each trigger and clears the canvas a short while later. Rendering is
/// best effort: failures are reported to the caller but never retried. With an audio clock the
/// marker waits until its hit actually sounds; a draw failing then is only logged.
pub struct FeedbackRenderer {
    canvas: Arc<dyn Canvas>,
    runtime: Handle,
    clock: Option<Arc<dyn Sink>>,
    clear_delay: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedbackRenderer {
    /// Creates a renderer that schedules its clears on the given runtime.
    pub fn new(canvas: Arc<dyn Canvas>, runtime: Handle) -> FeedbackRenderer {
        FeedbackRenderer {
            canvas,
            runtime,
            clock: None,
            clear_delay: CLEAR_DELAY,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clear_delay(mut self, clear_delay: Duration) -> FeedbackRenderer {
        self.clear_delay = clear_delay;
        self
    }

    /// Lines markers up with the sink's clock instead of drawing them when hits are scheduled.
    pub fn with_clock(mut self, clock: Arc<dyn Sink>) -> FeedbackRenderer {
        self.clock = Some(clock);
        self
    }

    /// Draws the voice's marker and schedules the canvas clear.
    pub fn show(&self, voice: Voice) -> Result<(), CanvasError> {
        let marker = marker_for(voice);
        self.canvas
            .fill_shape(marker.color, marker.shape, marker.position)?;

        let canvas = self.canvas.clone();
        let clear_delay = self.clear_delay;
        self.track(self.runtime.spawn(async move {
            tokio::time::sleep(clear_delay).await;
            if let Err(e) = canvas.clear() {
                warn!(err = %e, "Unable to clear canvas");
            }
        }));
        Ok(())
    }

    /// Draws the voice's marker once `delay` has passed, then clears it.
    fn show_after(&self, voice: Voice, delay: Duration) {
        let marker = marker_for(voice);
        let canvas = self.canvas.clone();
        let clear_delay = self.clear_delay;
        self.track(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = canvas.fill_shape(marker.color, marker.shape, marker.position) {
                warn!(%voice, err = %e, "Unable to draw marker");
                return;
            }
            tokio::time::sleep(clear_delay).await;
            if let Err(e) = canvas.clear() {
                warn!(err = %e, "Unable to clear canvas");
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// The number of draws and clears that haven't run yet.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Aborts every draw and clear that hasn't run yet.
    pub fn cancel_pending(&self) {
        for handle in self.pending.lock().drain(..) {
            handle.abort();
        }
    }
}

impl TriggerObserver for FeedbackRenderer {
    fn on_trigger(&self, event: &TriggerEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let lead = self
            .clock
            .as_ref()
            .map(|clock| event.time - clock.now())
            .and_then(|lead| Duration::try_from_secs_f64(lead).ok())
            .filter(|lead| !lead.is_zero());
        match lead {
            Some(lead) => {
                self.show_after(event.voice, lead);
                Ok(())
            }
            None => Ok(self.show(event.voice)?),
        }
    }
}

impl Drop for FeedbackRenderer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;
    use crate::testutil::eventually_async;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Fill(Color, Shape, Position),
        Clear,
    }

    #[derive(Default)]
    struct RecordingCanvas {
        calls: Mutex<Vec<Call>>,
        broken: bool,
    }

    impl RecordingCanvas {
        fn clears(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|call| **call == Call::Clear)
                .count()
        }
    }

    impl Canvas for RecordingCanvas {
        fn fill_shape(
            &self,
            color: Color,
            shape: Shape,
            position: Position,
        ) -> Result<(), CanvasError> {
            if self.broken {
                return Err(CanvasError::Unavailable("detached".to_string()));
            }
            self.calls.lock().push(Call::Fill(color, shape, position));
            Ok(())
        }

        fn clear(&self) -> Result<(), CanvasError> {
            self.calls.lock().push(Call::Clear);
            Ok(())
        }
    }

    #[test]
    fn test_markers_are_distinct() {
        let markers: Vec<Marker> = Voice::ALL.iter().map(|voice| marker_for(*voice)).collect();
        for (i, a) in markers.iter().enumerate() {
            for b in &markers[i + 1..] {
                assert_ne!(a.color, b.color);
                assert_ne!(a.position, b.position);
            }
        }
        assert_eq!(marker_for(Voice::Kick).color.to_string(), "#e03c31");
    }

    #[tokio::test]
    async fn test_show_then_clear() -> Result<(), CanvasError> {
        let canvas = Arc::new(RecordingCanvas::default());
        let renderer = FeedbackRenderer::new(canvas.clone(), Handle::current());

        renderer.show(Voice::Snare)?;
        let marker = marker_for(Voice::Snare);
        assert_eq!(
            *canvas.calls.lock(),
            vec![Call::Fill(marker.color, marker.shape, marker.position)]
        );
        assert_eq!(renderer.pending_count(), 1);

        eventually_async(
            || async { canvas.clears() == 1 && renderer.pending_count() == 0 },
            "Canvas was never cleared",
        )
        .await;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_pending() -> Result<(), CanvasError> {
        let canvas = Arc::new(RecordingCanvas::default());
        let renderer = FeedbackRenderer::new(canvas.clone(), Handle::current())
            .with_clear_delay(Duration::from_millis(50));

        renderer.show(Voice::Kick)?;
        renderer.show(Voice::HiHat)?;
        renderer.cancel_pending();
        assert_eq!(renderer.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(canvas.clears(), 0);
        assert_eq!(canvas.calls.lock().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_is_reported_to_observer_caller() {
        let canvas = Arc::new(RecordingCanvas {
            broken: true,
            ..Default::default()
        });
        let renderer = FeedbackRenderer::new(canvas.clone(), Handle::current());

        let event = TriggerEvent {
            step: 0,
            voice: Voice::Kick,
            time: 0.0,
        };
        assert!(renderer.on_trigger(&event).is_err());
        assert_eq!(renderer.pending_count(), 0);
        assert!(canvas.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_marker_waits_for_the_hit() {
        let canvas = Arc::new(RecordingCanvas::default());
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        sink.set_now(1.0);
        let renderer = FeedbackRenderer::new(canvas.clone(), Handle::current())
            .with_clock(sink.clone())
            .with_clear_delay(Duration::from_millis(10));

        let event = TriggerEvent {
            step: 0,
            voice: Voice::Kick,
            time: 1.1,
        };
        assert!(renderer.on_trigger(&event).is_ok());
        assert!(canvas.calls.lock().is_empty());
        assert_eq!(renderer.pending_count(), 1);

        let marker = marker_for(Voice::Kick);
        eventually_async(
            || async { canvas.clears() == 1 },
            "Delayed marker was never drawn and cleared",
        )
        .await;
        assert_eq!(
            *canvas.calls.lock(),
            vec![Call::Fill(marker.color, marker.shape, marker.position), Call::Clear]
        );
    }

    #[tokio::test]
    async fn test_past_hit_draws_immediately() -> Result<(), Box<dyn Error + Send + Sync>> {
        let canvas = Arc::new(RecordingCanvas::default());
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        sink.set_now(2.0);
        let renderer =
            FeedbackRenderer::new(canvas.clone(), Handle::current()).with_clock(sink);

        renderer.on_trigger(&TriggerEvent {
            step: 3,
            voice: Voice::Snare,
            time: 1.9,
        })?;
        assert_eq!(canvas.calls.lock().len(), 1);
        Ok(())
    }
}
