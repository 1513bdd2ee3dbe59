use crate::core::error::FrameError;

/// Capacity of outbound frames built by the console
pub const MAX_FRAME_BYTES: usize = 256;

/// A radio frame measured in bits.
///
/// Frames on the air are not always byte aligned (a REQA is 7 bits), so
/// the length is tracked in bits and the backing bytes are sized to fit.
/// Capacity is fixed at construction and every write is bounds checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    bits: usize,
    capacity: usize,
}

impl BitBuffer {
    /// Create an empty buffer that can hold `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            bits: 0,
            capacity,
        }
    }

    /// Create a byte-aligned frame with the default capacity
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Self::from_bits(bytes, bytes.len() * 8)
    }

    /// Create a frame of `bits` bits taken from `bytes`
    pub fn from_bits(bytes: &[u8], bits: usize) -> Result<Self, FrameError> {
        let mut buf = Self::with_capacity(MAX_FRAME_BYTES);
        buf.set_bits(bytes, bits)?;
        Ok(buf)
    }

    /// Replace the contents with `bits` bits taken from `bytes`.
    ///
    /// `bytes` must hold at least `bits` bits; extra bytes are ignored.
    pub fn set_bits(&mut self, bytes: &[u8], bits: usize) -> Result<(), FrameError> {
        let needed = bits.div_ceil(8);
        if needed > self.capacity {
            return Err(FrameError::Overflow {
                needed,
                capacity: self.capacity,
            });
        }
        if needed > bytes.len() {
            return Err(FrameError::Overflow {
                needed,
                capacity: bytes.len(),
            });
        }

        self.data.clear();
        self.data.extend_from_slice(&bytes[..needed]);
        self.bits = bits;
        Ok(())
    }

    /// Append whole bytes to a byte-aligned frame
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if !self.is_byte_aligned() {
            return Err(FrameError::NotByteAligned(self.bits));
        }

        let needed = self.data.len() + bytes.len();
        if needed > self.capacity {
            return Err(FrameError::Overflow {
                needed,
                capacity: self.capacity,
            });
        }

        self.data.extend_from_slice(bytes);
        self.bits += bytes.len() * 8;
        Ok(())
    }

    pub fn size_bits(&self) -> usize {
        self.bits
    }

    /// Bytes occupied, counting a trailing partial byte
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Bytes that are completely filled
    pub fn whole_bytes(&self) -> usize {
        self.bits / 8
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bits % 8 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All occupied bytes, including a trailing partial byte
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Only the completely filled bytes
    pub fn whole_data(&self) -> &[u8] {
        &self.data[..self.whole_bytes()]
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.bits = 0;
    }
}
