use tracing::{debug, warn};

/// Start of text, opens a TIC frame.
pub const STX: u8 = 0x02;
/// End of text, closes a TIC frame.
pub const ETX: u8 = 0x03;

/// A historical-mode frame is a few hundred bytes; anything past this means
/// the end marker was lost.
const MAX_FRAME_LEN: usize = 4096;

/// Rebuilds TIC frames from a continuous byte stream using only the STX/ETX
/// marker bytes.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Option<Vec<u8>>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// True while bytes are being accumulated between STX and ETX.
    pub fn in_frame(&self) -> bool {
        self.buffer.is_some()
    }

    /// Feeds one byte, returning the frame body once its ETX is seen.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            STX => {
                if let Some(partial) = &self.buffer {
                    if !partial.is_empty() {
                        debug!("Restarting frame, dropped {} bytes", partial.len());
                    }
                }
                self.buffer = Some(Vec::with_capacity(512));
                None
            }
            ETX => match self.buffer.take() {
                Some(frame) if !frame.is_empty() => Some(frame),
                _ => None,
            },
            _ => {
                let buffer = self.buffer.as_mut()?;
                if buffer.len() >= MAX_FRAME_LEN {
                    warn!("Frame exceeded {} bytes without ETX, dropping it", MAX_FRAME_LEN);
                    self.buffer = None;
                    return None;
                }
                buffer.push(byte);
                None
            }
        }
    }

    /// Feeds a slice of bytes, collecting every frame completed along the way.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Forgets any partial frame, used when the device is reopened.
    pub fn reset(&mut self) {
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_without_markers_yields_nothing() {
        let mut assembler = FrameAssembler::new();
        let noise: Vec<u8> = (0u8..=255).filter(|b| *b != STX && *b != ETX).collect();
        assert!(assembler.extend(&noise).is_empty());
        assert!(!assembler.in_frame());
    }

    #[test]
    fn test_single_frame() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.extend(b"junk\x02\nPAPP 00390 -\r\x03tail");
        assert_eq!(frames, vec![b"\nPAPP 00390 -\r".to_vec()]);
        assert!(!assembler.in_frame());
    }

    #[test]
    fn test_stx_restarts_partial_frame() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.extend(b"\x02partial\x02full\x03");
        assert_eq!(frames, vec![b"full".to_vec()]);
    }

    #[test]
    fn test_empty_frame_is_ignored() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.extend(b"\x02\x03").is_empty());
        assert!(assembler.extend(b"\x03\x03").is_empty());
        assert!(!assembler.in_frame());
    }

    #[test]
    fn test_consecutive_frames() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.extend(b"\x02one\x03\x02two\x03");
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.extend(b"\x02ab").is_empty());
        assert!(assembler.in_frame());
        assert_eq!(assembler.extend(b"cd\x03"), vec![b"abcd".to_vec()]);
    }

    #[test]
    fn test_oversized_frame_is_abandoned() {
        let mut assembler = FrameAssembler::new();
        assembler.push(STX);
        for _ in 0..=MAX_FRAME_LEN {
            assembler.push(b'x');
        }
        assert!(!assembler.in_frame());
        assert_eq!(assembler.push(ETX), None);
        assert_eq!(assembler.extend(b"\x02ok\x03"), vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.extend(b"\x02half");
        assembler.reset();
        assert!(assembler.extend(b"rest\x03").is_empty());
    }
}
