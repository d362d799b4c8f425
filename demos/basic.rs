use extremekeeper::{BoundedExtremeQueue, LatencyConfig, LatencyRecorder};

fn main() {
    // Keep the 3 largest values seen. The root (peek) is the smallest of them,
    // i.e. the next one to be evicted.
    let mut slowest = BoundedExtremeQueue::max(3);
    for latency in [120, 80, 950, 60, 430, 2_000, 75] {
        slowest.add(latency);
    }
    println!("next to evict: {:?}", slowest.peek());

    // Lowering the limit does not evict anything until shrink() (or further adds).
    slowest.set_limit(2);
    println!("after set_limit(2): {} retained", slowest.len());
    slowest.shrink();
    println!("after shrink(): {:?}", slowest.clone().into_sorted_vec());

    // A recorder keeps head and tail queues plus a histogram
    let config = LatencyConfig {
        bucket_lower: 0,
        bucket_upper: 1_000,
        bucket_granularity: 100,
        head_size: 2,
        tail_size: 2,
    };
    let mut recorder = match LatencyRecorder::new(config) {
        Ok(recorder) => recorder,
        Err(err) => {
            eprintln!("invalid config: {}", err);
            std::process::exit(1);
        }
    };
    for latency in [120, 80, 950, 60, 430, 2_000, 75] {
        recorder.record(latency);
    }

    let summary = recorder.summary();
    println!("\nfastest: {:?}", summary.head);
    println!("slowest: {:?}", summary.tail);
    for bucket in &summary.buckets {
        println!("[{}, {}): {}", bucket.lower, bucket.upper, bucket.count);
    }
    println!("above range: {}", summary.above_range);
}
