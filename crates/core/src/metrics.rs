use crate::worker::Direction;
use crate::RelayObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
struct DirectionCounters {
    reads: AtomicU64,
    bytes: AtomicU64,
    write_calls: AtomicU64,
    short_writes: AtomicU64,
}

/// Point-in-time copy of one direction's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub reads: u64,
    pub bytes: u64,
    pub write_calls: u64,
    /// Write calls beyond the first needed to flush a read.
    pub short_writes: u64,
}

#[derive(Debug)]
pub struct RelayMetrics {
    counters: [DirectionCounters; 2],
    start_time: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self, direction: Direction) -> DirectionStats {
        let c = &self.counters[direction.index()];
        DirectionStats {
            reads: c.reads.load(Ordering::SeqCst),
            bytes: c.bytes.load(Ordering::SeqCst),
            write_calls: c.write_calls.load(Ordering::SeqCst),
            short_writes: c.short_writes.load(Ordering::SeqCst),
        }
    }

    /// Average bytes per second since the metrics were created.
    pub fn get_throughput(&self, direction: Direction) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.snapshot(direction).bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl RelayObserver for RelayMetrics {
    fn on_read(&self, direction: Direction, _bytes: usize) {
        self.counters[direction.index()]
            .reads
            .fetch_add(1, Ordering::SeqCst);
    }

    fn on_write(&self, direction: Direction, bytes: usize, calls: usize) {
        let c = &self.counters[direction.index()];
        c.bytes.fetch_add(bytes as u64, Ordering::SeqCst);
        c.write_calls.fetch_add(calls as u64, Ordering::SeqCst);
        if calls > 1 {
            c.short_writes
                .fetch_add((calls - 1) as u64, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_direction() {
        let metrics = RelayMetrics::new();
        metrics.on_read(Direction::TunToSerial, 4);
        metrics.on_write(Direction::TunToSerial, 4, 2);
        metrics.on_read(Direction::SerialToTun, 10);
        metrics.on_write(Direction::SerialToTun, 10, 1);

        assert_eq!(
            metrics.snapshot(Direction::TunToSerial),
            DirectionStats {
                reads: 1,
                bytes: 4,
                write_calls: 2,
                short_writes: 1,
            }
        );
        assert_eq!(metrics.snapshot(Direction::SerialToTun).short_writes, 0);
    }

    #[test]
    fn test_throughput_tracks_bytes_written() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.get_throughput(Direction::TunToSerial), 0.0);

        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.on_write(Direction::TunToSerial, 4096, 1);

        let rate = metrics.get_throughput(Direction::TunToSerial);
        assert!(rate > 0.0);
        // At least 10ms have passed, so 4096 bytes is at most 409600 B/s.
        assert!(rate <= 409_600.0);
        assert_eq!(metrics.get_throughput(Direction::SerialToTun), 0.0);
    }
}
