use std::collections::BTreeMap;

use tracing::{debug, info};

use super::backend::{BufferId, PlaybackContext};
use super::codec::PlaybackBuffer;
use crate::error::VoiceResult;

/// Transitions of the active buffer set between empty and non-empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// The first buffer was scheduled onto an idle timeline
    Started,
    /// The last active buffer finished
    Drained,
}

/// Where a buffer landed on the playback clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledBuffer {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Gapless, order-preserving playback over a [`PlaybackContext`].
///
/// Each buffer starts at `max(now, next_start_time)` and pushes the cursor to its end, so
/// buffers play back to back in the order they were handed over regardless of when they
/// arrive.
pub struct PlaybackScheduler {
    context: Box<dyn PlaybackContext>,
    next_start_time: f64,
    active: BTreeMap<BufferId, ScheduledBuffer>,
    next_id: BufferId,
}

impl PlaybackScheduler {
    pub fn new(context: Box<dyn PlaybackContext>) -> Self {
        Self {
            context,
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(
        &mut self,
        buffer: PlaybackBuffer,
    ) -> VoiceResult<(ScheduledBuffer, Option<PlaybackSignal>)> {
        let start = self.context.current_time().max(self.next_start_time);
        let duration = buffer.duration_secs();
        let id = self.next_id;

        self.context.start(id, buffer.samples, start)?;

        self.next_id += 1;
        self.next_start_time = start + duration;

        let was_idle = self.active.is_empty();
        let scheduled = ScheduledBuffer { id, start, duration };
        self.active.insert(id, scheduled);

        debug!(
            "Scheduled buffer {} at {:.3}s ({:.3}s long, {} active)",
            id,
            start,
            duration,
            self.active.len()
        );

        Ok((scheduled, was_idle.then_some(PlaybackSignal::Started)))
    }

    /// Completion callback for a buffer that played to the end
    pub fn on_ended(&mut self, id: BufferId) -> Option<PlaybackSignal> {
        self.active.remove(&id)?;
        self.active.is_empty().then_some(PlaybackSignal::Drained)
    }

    /// Halt every active buffer and pull the cursor back to the current clock time
    pub fn stop(&mut self) {
        if !self.active.is_empty() {
            info!("Halting {} scheduled buffer(s)", self.active.len());
        }
        for id in std::mem::take(&mut self.active).into_keys() {
            self.context.stop(id);
        }
        self.next_start_time = self.context.current_time();
    }

    /// Stop everything and close the underlying context. Safe to call more than once.
    pub fn close(&mut self) {
        self.stop();
        if !self.context.is_closed() {
            self.context.close();
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_drained(&self) -> bool {
        self.active.is_empty()
    }

    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }
}
