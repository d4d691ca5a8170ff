//! The pixel matrix with its multi event buffers (MEBs)
//!
//! The matrix holds a queue of up to three complete snapshots of the 1024x512
//! pixel matrix, each indexed by double column. Hits are latched into the newest
//! snapshot at the end of an accepted strobe, and read back out of the oldest
//! snapshot by the region readout units.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::chip::pixel::{PixelDoubleColumn, PixelHit};
use crate::chip::{
    N_DOUBLE_COLS, N_DOUBLE_COLS_PER_REGION, N_EVENT_BUFFERS, N_PIXEL_COLS, N_PIXEL_ROWS,
    N_REGIONS,
};

/// Histogram of multi event buffer usage: for each buffer count, the total time
/// (in ns) the chip spent holding that many buffers.
#[derive(Debug, Default)]
pub struct MebHistogram {
    histo: BTreeMap<usize, u64>,
    last_update_time_ns: u64,
}

impl MebHistogram {
    /// Account the time since the last update to the given buffer count
    fn update(&mut self, meb_count: usize, time_now_ns: u64) {
        *self.histo.entry(meb_count).or_insert(0) +=
            time_now_ns.saturating_sub(self.last_update_time_ns);
        self.last_update_time_ns = time_now_ns;
    }

    /// The histogram values: `buffer count -> total ns at that count`
    pub fn values(&self) -> &BTreeMap<usize, u64> {
        &self.histo
    }
}

/// One multi event buffer slice: a full-matrix snapshot indexed by double column
type MebSlice = Vec<PixelDoubleColumn>;

/// The pixel matrix multi event buffers.
pub struct PixelMatrix {
    /// The MEB slices; front is the oldest event
    column_buffs: VecDeque<MebSlice>,
    /// Hits remaining in each slice, parallel to `column_buffs`
    column_buffs_pixels_left: VecDeque<usize>,
    meb_histogram: MebHistogram,
    /// Hits actually latched into an MEB
    latched_pixel_hit_count: u64,
    /// Hits discarded because the pixel was already set in the MEB
    duplicate_pixel_hit_count: u64,
}

impl Default for PixelMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelMatrix {
    /// Create an empty matrix with no open events
    pub fn new() -> Self {
        Self {
            column_buffs: VecDeque::with_capacity(N_EVENT_BUFFERS),
            column_buffs_pixels_left: VecDeque::with_capacity(N_EVENT_BUFFERS),
            meb_histogram: MebHistogram::default(),
            latched_pixel_hit_count: 0,
            duplicate_pixel_hit_count: 0,
        }
    }

    /// Open a new event: push an empty MEB slice. Subsequent [Self::set_pixel]
    /// calls latch hits into this slice.
    pub fn new_event(&mut self, event_time_ns: u64) {
        self.meb_histogram
            .update(self.column_buffs.len(), event_time_ns);
        self.column_buffs
            .push_back(vec![PixelDoubleColumn::default(); N_DOUBLE_COLS]);
        self.column_buffs_pixels_left.push_back(0);
        assert!(
            self.column_buffs.len() <= N_EVENT_BUFFERS,
            "more than {N_EVENT_BUFFERS} multi event buffers in use"
        );
    }

    /// Delete the oldest event. Any hits still left in it never made it into a
    /// data word, so their readout counters are rolled back.
    pub fn delete_event(&mut self, time_now_ns: u64) {
        if self.column_buffs.is_empty() {
            return;
        }
        self.meb_histogram
            .update(self.column_buffs.len(), time_now_ns);
        let mut oldest = self.column_buffs.pop_front().unwrap();
        let _ = self.column_buffs_pixels_left.pop_front();
        for dcol in &mut oldest {
            for pixel in dcol.take_all() {
                pixel.decrement_readout_count();
            }
        }
    }

    /// Flush the oldest event: wipe its remaining hits (rolling their readout
    /// counters back) but keep the slice itself so an in-flight readout of the
    /// slice terminates through the normal region trailer path.
    pub fn flush_oldest_event(&mut self, time_now_ns: u64) {
        let Some(oldest) = self.column_buffs.front_mut() else {
            return;
        };
        let mut wiped = 0_usize;
        for dcol in oldest.iter_mut() {
            for pixel in dcol.take_all() {
                pixel.decrement_readout_count();
                wiped += 1;
            }
        }
        if let Some(left) = self.column_buffs_pixels_left.front_mut() {
            *left = 0;
        }
        log::debug!("MEB flush at {time_now_ns} ns wiped {wiped} unread hits");
    }

    /// Latch a hit into the newest (most recently opened) event.
    ///
    /// Panics if no event is open or the coordinate is out of range; both are
    /// front end programming errors.
    pub fn set_pixel(&mut self, pixel: Rc<PixelHit>) {
        assert!(
            (pixel.col() as usize) < N_PIXEL_COLS && (pixel.row() as usize) < N_PIXEL_ROWS,
            "pixel coordinate out of range"
        );
        let newest = self
            .column_buffs
            .back_mut()
            .expect("set_pixel with no open event");
        let dcol = pixel.double_col() as usize;
        if newest[dcol].set_pixel(pixel.clone()) {
            pixel.increment_readout_count();
            self.latched_pixel_hit_count += 1;
            *self.column_buffs_pixels_left.back_mut().unwrap() += 1;
        } else {
            self.duplicate_pixel_hit_count += 1;
        }
    }

    /// Read out and erase the next pixel from the oldest event, scanning double
    /// columns `start_double_col..stop_double_col` in ascending order. Within a
    /// double column the pixels come out in priority encoder order.
    pub fn read_pixel(
        &mut self,
        _time_now_ns: u64,
        start_double_col: usize,
        stop_double_col: usize,
    ) -> Option<Rc<PixelHit>> {
        assert!(
            start_double_col < stop_double_col && stop_double_col <= N_DOUBLE_COLS,
            "double column range out of bounds"
        );
        let oldest = self.column_buffs.front_mut()?;
        for dcol in &mut oldest[start_double_col..stop_double_col] {
            if dcol.pixel_hits_remaining() > 0 {
                let pixel = dcol.read_pixel();
                *self.column_buffs_pixels_left.front_mut().unwrap() -= 1;
                return pixel;
            }
        }
        None
    }

    /// Read out and erase the next pixel from the given region of the oldest event
    pub fn read_pixel_region(&mut self, region: usize, time_now_ns: u64) -> Option<Rc<PixelHit>> {
        assert!(region < N_REGIONS, "region out of range");
        self.read_pixel(
            time_now_ns,
            N_DOUBLE_COLS_PER_REGION * region,
            N_DOUBLE_COLS_PER_REGION * (region + 1),
        )
    }

    /// Does the given region of the oldest event hold no hits?
    pub fn region_empty(&self, region: usize) -> bool {
        assert!(region < N_REGIONS, "region out of range");
        let Some(oldest) = self.column_buffs.front() else {
            return true;
        };
        let start = N_DOUBLE_COLS_PER_REGION * region;
        oldest[start..start + N_DOUBLE_COLS_PER_REGION]
            .iter()
            .all(|dcol| dcol.pixel_hits_remaining() == 0)
    }

    /// Number of events currently stored (0..=3)
    pub fn num_events(&self) -> usize {
        self.column_buffs.len()
    }

    /// Hits remaining in the oldest event, 0 if no event is stored
    pub fn hits_remaining_in_oldest_event(&self) -> usize {
        self.column_buffs_pixels_left.front().copied().unwrap_or(0)
    }

    /// Total hits remaining over all events
    pub fn hit_total_all_events(&self) -> usize {
        self.column_buffs_pixels_left.iter().sum()
    }

    /// Bring the MEB histogram up to date (call at end of run before reading it)
    pub fn update_histogram(&mut self, time_now_ns: u64) {
        self.meb_histogram
            .update(self.column_buffs.len(), time_now_ns);
    }

    /// The MEB usage histogram
    pub fn meb_histogram(&self) -> &MebHistogram {
        &self.meb_histogram
    }

    /// Hits latched into an MEB so far
    pub fn latched_pixel_hit_count(&self) -> u64 {
        self.latched_pixel_hit_count
    }

    /// Hits discarded as duplicates so far
    pub fn duplicate_pixel_hit_count(&self) -> u64 {
        self.duplicate_pixel_hit_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hit(col: u16, row: u16) -> Rc<PixelHit> {
        Rc::new(PixelHit::new(0, col, row, 0, 1000))
    }

    #[test]
    #[should_panic(expected = "no open event")]
    fn set_pixel_without_event_panics() {
        let mut matrix = PixelMatrix::new();
        matrix.set_pixel(hit(0, 0));
    }

    #[test]
    fn set_and_read_single_pixel() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(0);
        matrix.set_pixel(hit(100, 200));
        assert_eq!(matrix.num_events(), 1);
        assert_eq!(matrix.hits_remaining_in_oldest_event(), 1);
        assert!(!matrix.region_empty(3));
        assert!(matrix.region_empty(0));

        let pixel = matrix.read_pixel_region(3, 100).unwrap();
        assert_eq!((pixel.col(), pixel.row()), (100, 200));
        assert_eq!(matrix.hits_remaining_in_oldest_event(), 0);
        assert!(matrix.region_empty(3));
        assert!(matrix.read_pixel_region(3, 125).is_none());
    }

    #[test]
    fn duplicate_hits_are_counted_not_latched() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(0);
        let first = hit(5, 5);
        matrix.set_pixel(first.clone());
        matrix.set_pixel(hit(5, 5));
        assert_eq!(matrix.latched_pixel_hit_count(), 1);
        assert_eq!(matrix.duplicate_pixel_hit_count(), 1);
        assert_eq!(matrix.hits_remaining_in_oldest_event(), 1);
        // Only the latched hit got its readout counter bumped
        assert_eq!(first.readout_count(), 1);
    }

    #[test]
    fn reads_come_from_oldest_event() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(0);
        matrix.set_pixel(hit(0, 0));
        matrix.new_event(100);
        matrix.set_pixel(hit(0, 1));

        let pixel = matrix.read_pixel(150, 0, N_DOUBLE_COLS).unwrap();
        assert_eq!((pixel.col(), pixel.row()), (0, 0));
        // Oldest event drained, newest untouched until the oldest is deleted
        assert!(matrix.read_pixel(160, 0, N_DOUBLE_COLS).is_none());
        matrix.delete_event(200);
        let pixel = matrix.read_pixel(225, 0, N_DOUBLE_COLS).unwrap();
        assert_eq!((pixel.col(), pixel.row()), (0, 1));
    }

    #[test]
    fn flush_rolls_back_readout_counters_and_keeps_slice() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(0);
        let pixel = hit(10, 10);
        matrix.set_pixel(pixel.clone());
        assert_eq!(pixel.readout_count(), 1);

        matrix.flush_oldest_event(100);
        assert_eq!(pixel.readout_count(), 0);
        assert_eq!(matrix.num_events(), 1);
        assert_eq!(matrix.hits_remaining_in_oldest_event(), 0);
        assert!(matrix.region_empty(0));
    }

    #[test]
    fn delete_event_rolls_back_unread_hits() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(0);
        let pixel = hit(10, 10);
        matrix.set_pixel(pixel.clone());
        matrix.delete_event(100);
        assert_eq!(pixel.readout_count(), 0);
        assert_eq!(matrix.num_events(), 0);
    }

    #[test]
    fn meb_histogram_accumulates_time_per_buffer_count() {
        let mut matrix = PixelMatrix::new();
        matrix.new_event(1000); // 0 buffers for 1000 ns
        matrix.new_event(1500); // 1 buffer for 500 ns
        matrix.delete_event(2500); // 2 buffers for 1000 ns
        matrix.update_histogram(4000); // 1 buffer for 1500 ns

        let histo = matrix.meb_histogram().values();
        assert_eq!(histo.get(&0), Some(&1000));
        assert_eq!(histo.get(&1), Some(&2000));
        assert_eq!(histo.get(&2), Some(&1000));
    }
}
