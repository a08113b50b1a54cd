//! Ping-pong round-trip latency for the blocking queue - for perf profiling
//!
//! Run: cargo bench --bench perf_blocking_rtt
//! Profile: sudo perf stat -e cycles,instructions,context-switches ./target/release/deps/perf_blocking_rtt-*

use hdrhistogram::Histogram;
use std::thread;
use std::time::Instant;
use weir_queue::mpmc::bounded::BlockingQueue;

const ROUND_TRIPS: u64 = 100_000;
const WARMUP: u64 = 10_000;

fn main() {
    let ping = BlockingQueue::<u64>::new(1);
    let pong = BlockingQueue::<u64>::new(1);

    let echo = {
        let ping = ping.clone();
        let pong = pong.clone();
        thread::spawn(move || {
            for _ in 0..WARMUP + ROUND_TRIPS {
                let value = ping.take();
                pong.put(value);
            }
        })
    };

    for i in 0..WARMUP {
        ping.put(i);
        pong.take();
    }

    let mut hist = Histogram::<u64>::new_with_bounds(1, 1_000_000_000, 3).unwrap();
    for i in 0..ROUND_TRIPS {
        let start = Instant::now();
        ping.put(i);
        pong.take();
        hist.saturating_record(start.elapsed().as_nanos() as u64);
    }

    echo.join().unwrap();

    println!("blocking queue ping-pong rtt over {ROUND_TRIPS} round trips:");
    println!("  p50    {:>8} ns", hist.value_at_quantile(0.50));
    println!("  p90    {:>8} ns", hist.value_at_quantile(0.90));
    println!("  p99    {:>8} ns", hist.value_at_quantile(0.99));
    println!("  p99.9  {:>8} ns", hist.value_at_quantile(0.999));
    println!("  max    {:>8} ns", hist.max());
}
