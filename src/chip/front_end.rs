//! The pixel front end: a queue of time-active hits waiting to be strobed
//!
//! The analog front end of each pixel keeps its discriminated output high for
//! the shaping time of the pulse. This module models that as a queue of hits
//! with active time windows; when a strobe closes, every hit whose window
//! overlaps the strobe interval is latched into the newly opened multi event
//! buffer.

use std::rc::Rc;

use crate::chip::pixel::PixelHit;

/// Queue of hits whose analog pulses are (or will become) over threshold
#[derive(Debug, Default)]
pub struct PixelFrontEnd {
    hit_queue: Vec<Rc<PixelHit>>,
}

impl PixelFrontEnd {
    /// Create an empty front end
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hit with its active time window
    pub fn pixel_input(&mut self, hit: Rc<PixelHit>) {
        self.hit_queue.push(hit);
    }

    /// All queued hits active at some point during `[strobe_start_ns, strobe_end_ns)`
    pub fn hits_in_strobe_window(
        &self,
        strobe_start_ns: u64,
        strobe_end_ns: u64,
    ) -> impl Iterator<Item = &Rc<PixelHit>> {
        self.hit_queue
            .iter()
            .filter(move |hit| hit.is_active_during(strobe_start_ns, strobe_end_ns))
    }

    /// Drop every hit whose active window ended at or before `time_ns`.
    ///
    /// The caller is responsible for passing a time no later than the start of
    /// the oldest strobe that can still open.
    pub fn remove_inactive_hits(&mut self, time_ns: u64) {
        self.hit_queue
            .retain(|hit| hit.active_end_time_ns() > time_ns);
    }

    /// Number of queued hits
    pub fn len(&self) -> usize {
        self.hit_queue.len()
    }

    /// True if no hits are queued
    pub fn is_empty(&self) -> bool {
        self.hit_queue.is_empty()
    }
}
