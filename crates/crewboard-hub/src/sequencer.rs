use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide monotonic counter behind every broadcast. First-write-wins:
/// the mutation that reached the store first carries the lower sequence.
/// Resets with the process; peers treat it as monotonic within a session and
/// re-anchor on the full snapshot they receive at connect.
#[derive(Debug, Default)]
pub struct Sequencer {
    seq: AtomicI64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> i64 {
        self.seq.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn next_is_monotonic() {
        let seq = Sequencer::new();
        let mut prev = seq.next();
        for _ in 0..100 {
            let next = seq.next();
            assert!(next > prev, "sequence not monotonic: {next} <= {prev}");
            prev = next;
        }
    }

    #[test]
    fn current_tracks_last_assigned() {
        let seq = Sequencer::new();
        assert_eq!(seq.current(), 0);
        seq.next();
        seq.next();
        seq.next();
        assert_eq!(seq.current(), 3);
    }

    #[test]
    fn concurrent_next_yields_unique_values() {
        let seq = Arc::new(Sequencer::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let seq = seq.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| seq.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for value in handle.join().expect("thread") {
                assert!(seen.insert(value), "duplicate sequence number: {value}");
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(seq.current(), 1000);
    }
}
