/// First printable code point (space)
pub const PRINTABLE_START: u8 = 32;
/// Last printable code point (tilde)
pub const PRINTABLE_END: u8 = 126;
/// Number of buckets in a histogram
pub const PRINTABLE_COUNT: usize = (PRINTABLE_END - PRINTABLE_START + 1) as usize;

/// Default size of the working buffer used to stream payloads (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Returns true if `byte` lies in the printable range [32, 126]
#[inline]
pub fn is_printable(byte: u8) -> bool {
    (PRINTABLE_START..=PRINTABLE_END).contains(&byte)
}

/// Occurrence count per printable code point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram {
    buckets: [u32; PRINTABLE_COUNT],
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; PRINTABLE_COUNT],
        }
    }

    /// Count for `ch`, or `None` if `ch` is not a printable ASCII character
    pub fn get(&self, ch: char) -> Option<u32> {
        let byte = u8::try_from(ch).ok().filter(|b| is_printable(*b))?;
        Some(self.buckets[(byte - PRINTABLE_START) as usize])
    }

    /// Adds every bucket of `other` into `self`.
    ///
    /// Buckets saturate at `u32::MAX` rather than wrapping around.
    pub fn merge(&mut self, other: &Histogram) {
        for (total, add) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *total = total.saturating_add(*add);
        }
    }

    /// Sum of all buckets
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|&n| u64::from(n)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|&n| n == 0)
    }

    /// Iterates `(character, count)` pairs in ascending code point order
    pub fn iter(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, &n)| ((PRINTABLE_START + i as u8) as char, n))
    }

    #[inline]
    fn bump(&mut self, byte: u8) {
        let slot = &mut self.buckets[(byte - PRINTABLE_START) as usize];
        *slot = slot.saturating_add(1);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection counting state.
///
/// Fed chunk by chunk as payload bytes arrive; the result does not depend on
/// how the payload was split.
#[derive(Debug, Clone, Default)]
pub struct PrintableCounter {
    count: u32,
    histogram: Histogram,
}

impl PrintableCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies every byte of `chunk`, updating the count and histogram
    pub fn feed(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if is_printable(byte) {
                // a payload is at most u32::MAX bytes, so this cannot overflow
                self.count = self.count.saturating_add(1);
                self.histogram.bump(byte);
            }
        }
    }

    /// Printable characters seen so far
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn into_parts(self) -> (u32, Histogram) {
        (self.count, self.histogram)
    }
}

/// Counts printable bytes of a complete in-memory payload
pub fn printable_count(payload: &[u8]) -> u32 {
    let mut counter = PrintableCounter::new();
    counter.feed(payload);
    counter.count()
}
