//! Writes the emitted 24-bit word stream to file/stdout
//!
//! Receives word batches from the simulation loop over a channel and writes the
//! raw 3-byte payloads through a buffer to keep syscalls down. The remaining
//! buffer is flushed on drop.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use byteorder::{BigEndian, WriteBytesExt};

use crate::config::inputoutput::{DataOutputMode, InputOutputOpt};
use crate::config::prelude::Config;

/// Buffered writer for the raw 24-bit payload stream
pub struct BufferedPayloadWriter {
    payload_buffer: Vec<u8>,
    buf_writer: Option<std::io::BufWriter<std::fs::File>>, // None -> stdout
    max_buffer_size: usize,
}

impl BufferedPayloadWriter {
    /// Create a writer from the configured output mode
    pub fn new(config: &impl InputOutputOpt, max_buffer_size: usize) -> Self {
        let buf_writer = match config.output_mode() {
            DataOutputMode::File(path) => {
                let file = std::fs::File::create(path).expect("Failed to create output file");
                Some(std::io::BufWriter::new(file))
            }
            DataOutputMode::Stdout | DataOutputMode::None => None,
        };
        Self {
            payload_buffer: Vec::with_capacity(max_buffer_size),
            buf_writer,
            max_buffer_size,
        }
    }

    /// Append 24-bit word values to the buffer, flushing when it fills up
    pub fn push_words(&mut self, words: &[u32]) {
        for &word in words {
            self.payload_buffer
                .write_u24::<BigEndian>(word)
                .expect("Writing to memory buffer cannot fail");
        }
        if self.payload_buffer.len() >= self.max_buffer_size {
            self.flush().expect("Failed to flush payload buffer");
        }
    }

    /// Write the buffered payloads out
    pub fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.buf_writer {
            Some(buf_writer) => buf_writer.write_all(&self.payload_buffer)?,
            None => std::io::stdout().write_all(&self.payload_buffer)?,
        }
        self.payload_buffer.clear();
        Ok(())
    }
}

impl Drop for BufferedPayloadWriter {
    fn drop(&mut self) {
        self.flush().expect("Failed to flush payload buffer");
    }
}

/// Spawn the writer thread consuming word batches until the channel disconnects
pub fn spawn_writer(
    config: &'static impl Config,
    stop_flag: Arc<AtomicBool>,
    data_recv: crossbeam_channel::Receiver<Vec<u32>>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("writer".to_string())
        .spawn(move || {
            let mut writer = BufferedPayloadWriter::new(config, 64 * 1024);
            while let Ok(words) = data_recv.recv() {
                if stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                writer.push_words(&words);
            }
        })
        .expect("Failed to spawn writer thread")
}
