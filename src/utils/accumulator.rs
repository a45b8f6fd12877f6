/// Fixed length circular buffer which gets written additively and drained sample by sample.
///
/// The write position leads the read position by a fixed latency. Every slot is cleared right
/// after it got read, so the buffer can be mixed into again when the write position wraps.
#[derive(Debug, Clone)]
pub struct OutputAccumulator {
    buffer: Box<[f32]>,
    read_pos: usize,
    write_pos: usize,
}

impl OutputAccumulator {
    /// Create a new, silent accumulator. `latency` must be smaller than `len`.
    pub fn new(len: usize, latency: usize) -> Self {
        assert!(len > 0 && latency < len, "Invalid accumulator length or latency");
        Self {
            buffer: vec![0.0; len].into_boxed_slice(),
            read_pos: 0,
            write_pos: latency,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Distance between the write and read position.
    pub fn latency(&self) -> usize {
        (self.write_pos + self.len() - self.read_pos) % self.len()
    }

    /// Mix a single value into the slot at the current write position.
    #[inline]
    pub fn add(&mut self, value: f32) {
        self.buffer[self.write_pos] += value;
    }

    /// Read and clear the slot at the read position and advance both positions by one.
    #[inline]
    pub fn pop(&mut self) -> f32 {
        let len = self.len();
        let value = std::mem::take(&mut self.buffer[self.read_pos]);
        self.read_pos = (self.read_pos + 1) % len;
        self.write_pos = (self.write_pos + 1) % len;
        value
    }

    /// Clear all slots without moving the positions.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// -------------------------------------------------------------------------------------------------
