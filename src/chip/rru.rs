//! The Region Readout Unit (RRU): matrix-to-FIFO readout with clustering
//!
//! Each of the 32 RRUs runs three small state machines on the system clock:
//!
//! - the matrix readout FSM drains its region of the oldest multi event buffer
//!   into the region FIFO, packing neighboring hits into DATA LONG words when
//!   clustering is enabled, and terminates the frame with a REGION_TRAILER
//!   sentinel;
//! - the valid FSM tells the TRU whether this region still has frame data worth
//!   reading;
//! - the header FSM puts a REGION_HEADER in front of the region's data words.
//!
//! On readout abort the RRU discards any in-progress cluster and purges its
//! FIFO, rolling back the readout counters of the pixels in the purged words.

use std::rc::Rc;

use crate::chip::fifo::WordFifo;
use crate::chip::matrix::PixelMatrix;
use crate::chip::pixel::PixelHit;
use crate::words::data_word::{AlpideDataWord, DATA_LONG_HITMAP_SIZE};

/// Matrix readout FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixReadoutState {
    Idle,
    StartReadout,
    ReadoutAndClustering,
    RegionTrailer,
}

/// Valid FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidState {
    Idle,
    Empty,
    Valid,
    Pop,
}

/// Header FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    Header,
    Data,
}

/// A pixel cluster being assembled for a DATA LONG word
#[derive(Debug)]
struct PixelCluster {
    encoder_id: u8,
    base_addr: u16,
    hitmap: u8,
    pixels: Vec<Rc<PixelHit>>,
}

/// What happened when a new hit was offered to an open cluster
enum ClusterFit {
    /// The hit is not adjacent to the cluster; the cluster must be closed first
    Outside,
    /// The hit was absorbed into the hitmap
    Absorbed,
    /// The hit was absorbed and filled the last hitmap bit
    AbsorbedAndFull,
}

impl PixelCluster {
    fn start(hit: Rc<PixelHit>) -> Self {
        Self {
            encoder_id: hit.encoder_id_in_region(),
            base_addr: hit.prienc_addr(),
            hitmap: 0,
            pixels: vec![hit],
        }
    }

    /// Try to absorb a hit that arrived in priority encoder order after the base
    fn offer(&mut self, hit: &Rc<PixelHit>) -> ClusterFit {
        let addr = hit.prienc_addr();
        if hit.encoder_id_in_region() != self.encoder_id
            || addr <= self.base_addr
            || addr > self.base_addr + DATA_LONG_HITMAP_SIZE
        {
            return ClusterFit::Outside;
        }
        let hitmap_bit = addr - self.base_addr - 1;
        self.hitmap |= 1 << hitmap_bit;
        self.pixels.push(hit.clone());
        if hitmap_bit == DATA_LONG_HITMAP_SIZE - 1 {
            ClusterFit::AbsorbedAndFull
        } else {
            ClusterFit::Absorbed
        }
    }

    /// Close the cluster into a DATA SHORT (single hit) or DATA LONG word
    fn into_word(self) -> AlpideDataWord {
        if self.hitmap == 0 {
            AlpideDataWord::DataShort {
                encoder_id: self.encoder_id,
                addr: self.base_addr,
                pixels: self.pixels,
            }
        } else {
            AlpideDataWord::DataLong {
                encoder_id: self.encoder_id,
                addr: self.base_addr,
                hitmap: self.hitmap,
                pixels: self.pixels,
            }
        }
    }
}

/// One region readout unit
pub struct RegionReadoutUnit {
    region_id: u8,
    fifo: WordFifo,
    readout_state: MatrixReadoutState,
    valid_state: ValidState,
    header_state: HeaderState,
    /// Delay counter implementing the matrix readout cadence
    readout_delay_counter: u8,
    /// True: one pixel every 2nd clock. False: one pixel every 3rd clock.
    matrix_readout_speed: bool,
    clustering_enabled: bool,
    cluster: Option<PixelCluster>,
}

impl RegionReadoutUnit {
    /// Create the RRU for `region_id` with the given region FIFO depth
    pub fn new(
        region_id: u8,
        fifo_size: usize,
        matrix_readout_speed: bool,
        clustering_enabled: bool,
    ) -> Self {
        Self {
            region_id,
            fifo: WordFifo::new(fifo_size),
            readout_state: MatrixReadoutState::Idle,
            valid_state: ValidState::Idle,
            header_state: HeaderState::Header,
            readout_delay_counter: 0,
            matrix_readout_speed,
            clustering_enabled,
            cluster: None,
        }
    }

    /// The region this RRU serves
    pub fn region_id(&self) -> u8 {
        self.region_id
    }

    /// Matrix readout for this frame is done (the FSM is back in idle)
    pub fn frame_readout_done(&self) -> bool {
        self.readout_state == MatrixReadoutState::Idle
    }

    /// True if the region FIFO holds no words at all (trailer included)
    pub fn fifo_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// The valid flag exposed to the TRU this cycle
    pub fn valid(&self) -> bool {
        match self.valid_state {
            ValidState::Idle | ValidState::Pop => false,
            ValidState::Empty => {
                (!self.fifo.is_empty() || self.cluster.is_some()) && !self.front_is_trailer()
            }
            // An empty FIFO keeps the region claimed until its trailer arrives
            ValidState::Valid => !self.front_is_trailer(),
        }
    }

    /// True if the TRU can read a word from this region right now
    pub fn has_readable_word(&self) -> bool {
        match self.header_state {
            HeaderState::Header => true,
            HeaderState::Data => self
                .fifo
                .peek()
                .is_some_and(|word| !word.is_region_trailer()),
        }
    }

    /// Read one word of region data out for the TRU: the REGION_HEADER first,
    /// then the words from the region FIFO.
    ///
    /// Must only be called when [Self::has_readable_word] is true.
    pub fn read_data_word(&mut self) -> AlpideDataWord {
        match self.header_state {
            HeaderState::Header => {
                self.header_state = HeaderState::Data;
                AlpideDataWord::RegionHeader {
                    region_id: self.region_id,
                }
            }
            HeaderState::Data => self
                .fifo
                .get()
                .expect("region data read from empty region FIFO"),
        }
    }

    /// Advance the matrix readout FSM by one clock cycle
    pub fn step_matrix_readout(
        &mut self,
        matrix: &mut PixelMatrix,
        frame_readout_start: bool,
        readout_abort: bool,
        time_now_ns: u64,
    ) {
        if readout_abort {
            self.discard_cluster();
            self.flush_fifo();
            self.readout_state = MatrixReadoutState::Idle;
            return;
        }
        match self.readout_state {
            MatrixReadoutState::Idle => {
                if frame_readout_start {
                    if matrix.region_empty(self.region_id as usize) {
                        self.readout_state = MatrixReadoutState::RegionTrailer;
                    } else {
                        self.readout_delay_counter = 0;
                        self.readout_state = MatrixReadoutState::StartReadout;
                    }
                }
            }
            MatrixReadoutState::StartReadout => {
                if self.matrix_readout_ready() {
                    self.readout_state = MatrixReadoutState::ReadoutAndClustering;
                } else {
                    self.readout_delay_counter += 1;
                }
            }
            MatrixReadoutState::ReadoutAndClustering => {
                if self.matrix_readout_ready() {
                    if matrix.region_empty(self.region_id as usize) {
                        // No more hits: emit the pending cluster, then the trailer
                        if self.flush_pending_cluster() {
                            self.readout_state = MatrixReadoutState::RegionTrailer;
                        }
                    } else if !self.fifo.is_full() {
                        let pixel = matrix
                            .read_pixel_region(self.region_id as usize, time_now_ns)
                            .expect("non-empty region returned no pixel");
                        log::trace!(
                            "RRU {region}: read pixel {pixel}",
                            region = self.region_id
                        );
                        self.process_hit(pixel);
                        self.readout_delay_counter = 0;
                    }
                } else {
                    self.readout_delay_counter += 1;
                }
            }
            MatrixReadoutState::RegionTrailer => {
                if self.fifo.put(AlpideDataWord::RegionTrailer) {
                    self.readout_state = MatrixReadoutState::Idle;
                }
            }
        }
    }

    /// Advance the valid and header FSMs by one clock cycle.
    ///
    /// `region_event_start` and `region_event_pop` are the TRU broadcasts
    /// latched from the previous cycle.
    pub fn step_readout_control(
        &mut self,
        region_event_start: bool,
        region_event_pop: bool,
        readout_abort: bool,
    ) {
        if readout_abort {
            self.valid_state = ValidState::Idle;
            self.header_state = HeaderState::Header;
            return;
        }
        match self.valid_state {
            ValidState::Idle => {
                if region_event_start {
                    self.valid_state = ValidState::Empty;
                }
            }
            ValidState::Empty => {
                if self.front_is_trailer() {
                    self.valid_state = ValidState::Pop;
                } else if !self.fifo.is_empty() {
                    self.valid_state = ValidState::Valid;
                }
            }
            ValidState::Valid => {
                if self.front_is_trailer() {
                    self.valid_state = ValidState::Pop;
                }
            }
            ValidState::Pop => {
                if region_event_pop {
                    let trailer = self.fifo.get();
                    debug_assert!(
                        trailer.is_some_and(|word| word.is_region_trailer()),
                        "pop broadcast without a region trailer at the FIFO front"
                    );
                    self.header_state = HeaderState::Header;
                    self.valid_state = ValidState::Idle;
                }
            }
        }
    }

    fn front_is_trailer(&self) -> bool {
        self.fifo.peek().is_some_and(|word| word.is_region_trailer())
    }

    fn matrix_readout_ready(&self) -> bool {
        if self.matrix_readout_speed {
            self.readout_delay_counter >= 1
        } else {
            self.readout_delay_counter >= 2
        }
    }

    /// Run the clustering rule for one pixel read from the matrix.
    ///
    /// At most one word is written to the region FIFO per call; the caller has
    /// already checked that the FIFO has room.
    fn process_hit(&mut self, pixel: Rc<PixelHit>) {
        if !self.clustering_enabled {
            let put_ok = self.fifo.put(AlpideDataWord::DataShort {
                encoder_id: pixel.encoder_id_in_region(),
                addr: pixel.prienc_addr(),
                pixels: vec![pixel],
            });
            debug_assert!(put_ok, "region FIFO overflow");
            return;
        }
        if self.cluster.is_none() {
            self.cluster = Some(PixelCluster::start(pixel));
            return;
        }
        let fit = self.cluster.as_mut().unwrap().offer(&pixel);
        match fit {
            ClusterFit::Absorbed => (),
            ClusterFit::AbsorbedAndFull => {
                let word = self.cluster.take().unwrap().into_word();
                let put_ok = self.fifo.put(word);
                debug_assert!(put_ok, "region FIFO overflow");
            }
            ClusterFit::Outside => {
                let word = self.cluster.take().unwrap().into_word();
                let put_ok = self.fifo.put(word);
                debug_assert!(put_ok, "region FIFO overflow");
                self.cluster = Some(PixelCluster::start(pixel));
            }
        }
    }

    /// Emit the pending cluster, if any. Returns true once no cluster is pending.
    fn flush_pending_cluster(&mut self) -> bool {
        if self.cluster.is_none() {
            return true;
        }
        if self.fifo.is_full() {
            return false;
        }
        let word = self.cluster.take().unwrap().into_word();
        let put_ok = self.fifo.put(word);
        debug_assert!(put_ok, "region FIFO overflow");
        true
    }

    /// Drop an in-progress cluster, rolling back its pixels' readout counters
    fn discard_cluster(&mut self) {
        if let Some(cluster) = self.cluster.take() {
            for pixel in &cluster.pixels {
                pixel.decrement_readout_count();
            }
        }
    }

    /// Purge the region FIFO, rolling back the readout counters of the pixels
    /// in the purged data words
    fn flush_fifo(&mut self) {
        while let Some(word) = self.fifo.get() {
            for pixel in word.pixels() {
                pixel.decrement_readout_count();
            }
        }
        self.header_state = HeaderState::Header;
    }
}
