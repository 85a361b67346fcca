use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::counter::Histogram;

/// Count for a single printable character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharCount {
    pub ch: char,
    pub count: u32,
}

/// Point-in-time view of the process-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub exchanges: u64,
    pub total_printable: u64,
    pub chars: Vec<CharCount>,
}

/// Process-wide character statistics.
///
/// Owned by the server and handed to the connection handler by `&mut`; the
/// only mutation is [`StatsStore::fold`], performed once per completed
/// exchange after its response has been written. Exchanges are handled one at
/// a time so no locking is involved.
#[derive(Debug, Default)]
pub struct StatsStore {
    totals: Histogram,
    exchanges: u64,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the histogram of one completed exchange
    pub fn fold(&mut self, exchange: &Histogram) {
        self.totals.merge(exchange);
        self.exchanges += 1;
    }

    pub fn totals(&self) -> &Histogram {
        &self.totals
    }

    /// Number of exchanges folded so far
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            exchanges: self.exchanges,
            total_printable: self.totals.total(),
            chars: self
                .totals
                .iter()
                .map(|(ch, count)| CharCount { ch, count })
                .collect(),
        }
    }
}

impl StatsSnapshot {
    /// Writes one `char '<c>' : <n> times` line per printable character
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for entry in &self.chars {
            writeln!(out, "char '{}' : {} times", entry.ch, entry.count)?;
        }
        Ok(())
    }

    pub fn write_json<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::PrintableCounter;

    fn histogram_of(payload: &[u8]) -> Histogram {
        let mut counter = PrintableCounter::new();
        counter.feed(payload);
        *counter.histogram()
    }

    #[test]
    fn test_empty_store() {
        let store = StatsStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.exchanges, 0);
        assert_eq!(snapshot.total_printable, 0);
        assert_eq!(snapshot.chars.len(), 95);
        assert!(snapshot.chars.iter().all(|c| c.count == 0));
    }

    #[test]
    fn test_fold_accumulates() {
        let mut store = StatsStore::new();
        store.fold(&histogram_of(b"abc"));
        store.fold(&histogram_of(b"a\n"));

        assert_eq!(store.exchanges(), 2);
        assert_eq!(store.totals().get('a'), Some(2));
        assert_eq!(store.totals().get('b'), Some(1));
        assert_eq!(store.snapshot().total_printable, 4);
    }

    #[test]
    fn test_text_format() {
        let mut store = StatsStore::new();
        store.fold(&histogram_of(b"  A"));

        let mut out = Vec::new();
        store.snapshot().write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 95);
        assert_eq!(lines[0], "char ' ' : 2 times");
        assert_eq!(lines[1], "char '!' : 0 times");
        assert!(lines.contains(&"char 'A' : 1 times"));
        assert_eq!(lines[94], "char '~' : 0 times");
    }
}
