// src/sink/spi.rs
//! LPD8806 strand on an SPI device node.
//!
//! The LPD8806 takes 7 bits per channel with the high bit set on every data
//! byte. A run of zero bytes resets the chain before the first pixel, and one
//! trailing zero latches the last pixel. The preamble grows with the strand
//! so long chains get enough clocks.

use super::{Delivery, OutputSink};
use anyhow::{Context, Result};
use log::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Number of zero bytes written before the pixel data of a `n_pixels` strand.
pub fn preamble_len(n_pixels: usize) -> usize {
    (n_pixels.div_ceil(32) + 2) * 5
}

/// Packs RGB bytes into `out` (cleared first) in LPD8806 wire format.
pub fn encode_lpd8806(rgb: &[u8], out: &mut Vec<u8>) {
    let n_pixels = rgb.len() / 3;
    out.clear();
    out.reserve(preamble_len(n_pixels) + rgb.len() + 1);
    out.resize(preamble_len(n_pixels), 0);
    out.extend(rgb.iter().map(|&v| 0x80 | (v >> 1)));
    out.push(0);
}

/// Inverse of the per-byte packing. Loses the low bit.
pub fn decode_lpd8806_byte(encoded: u8) -> u8 {
    (encoded & 0x7F) << 1
}

/// Writes frames to an SPI device (or any writer).
///
/// A failed write is returned as an error; the pump treats it as fatal.
pub struct HardwareSink<W: Write + Send = File> {
    device: W,
    scratch: Vec<u8>,
}

impl HardwareSink<File> {
    /// Opens the device node for the lifetime of the sink.
    pub fn open(path: &Path) -> Result<Self> {
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("Error opening SPI device {}", path.display()))?;
        info!("HardwareSink: opened {}", path.display());
        Ok(Self::new(device))
    }
}

impl<W: Write + Send> HardwareSink<W> {
    pub fn new(device: W) -> Self {
        Self {
            device,
            scratch: Vec::new(),
        }
    }

    pub fn device(&self) -> &W {
        &self.device
    }
}

impl<W: Write + Send> OutputSink for HardwareSink<W> {
    fn name(&self) -> &str {
        "spi"
    }

    fn deliver(&mut self, frame: &[u8]) -> Result<Delivery> {
        trace!("HardwareSink: sending {} values", frame.len());
        encode_lpd8806(frame, &mut self.scratch);
        self.device
            .write_all(&self.scratch)
            .context("Error writing to SPI device")?;
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn it_should_size_the_preamble_by_strand_length() {
        assert_eq!(preamble_len(0), 10);
        assert_eq!(preamble_len(1), 15);
        assert_eq!(preamble_len(32), 15);
        assert_eq!(preamble_len(33), 20);
        assert_eq!(preamble_len(160), 35);
    }

    #[test]
    fn it_should_frame_pixels_with_zero_preamble_and_latch() {
        let mut out = Vec::new();
        encode_lpd8806(&[0, 1, 2, 255, 128, 127], &mut out);

        assert_eq!(out.len(), 15 + 6 + 1);
        assert!(out[..15].iter().all(|&b| b == 0));
        assert_eq!(&out[15..21], &[0x80, 0x80, 0x81, 0xFF, 0xC0, 0xBF]);
        assert_eq!(out[21], 0);
    }

    #[test]
    fn it_should_recover_values_within_one_lsb() {
        let rgb: Vec<u8> = (0..=255u8).collect::<Vec<_>>().repeat(3);
        let mut out = Vec::new();
        encode_lpd8806(&rgb, &mut out);

        let data = &out[preamble_len(rgb.len() / 3)..out.len() - 1];
        assert_eq!(data.len(), rgb.len());
        for (&original, &encoded) in rgb.iter().zip(data) {
            assert!(encoded & 0x80 != 0);
            let decoded = decode_lpd8806_byte(encoded);
            assert!(original - decoded <= 1, "{} -> {}", original, decoded);
        }
    }

    #[test]
    fn it_should_reuse_the_scratch_buffer_between_frames() {
        let mut sink = HardwareSink::new(Vec::new());
        sink.deliver(&[10, 20, 30]).unwrap();
        sink.deliver(&[40, 50, 60]).unwrap();

        let written = sink.device();
        assert_eq!(written.len(), 2 * (15 + 3 + 1));
        assert_eq!(&written[34..37], &[0x80 | 20, 0x80 | 25, 0x80 | 30]);
    }

    struct DeadLink;

    impl Write for DeadLink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("link down"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn it_should_report_write_failures_as_errors() {
        let mut sink = HardwareSink::new(DeadLink);
        let err = sink.deliver(&[1, 2, 3]).unwrap_err();
        assert!(format!("{:#}", err).contains("link down"));
    }

    #[test]
    fn it_should_fail_to_open_a_missing_device() {
        assert!(HardwareSink::open(Path::new("/nonexistent/spidev9.9")).is_err());
    }
}
