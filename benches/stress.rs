use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use stayline::engine::{Engine, EngineError};
use stayline::feed::BookingFeed;
use stayline::model::*;

const PROPERTIES: usize = 200;
const CLIENTS: usize = 64;
const ATTEMPTS_PER_CLIENT: usize = 500;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Cheap deterministic generator so runs are comparable.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[derive(Default)]
struct ClientStats {
    reserve: Vec<Duration>,
    conflicts: usize,
    created: usize,
    check: Vec<Duration>,
}

async fn client(engine: Arc<Engine>, properties: Arc<Vec<PropertyId>>, seed: u64) -> ClientStats {
    let base = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    let submitted = NaiveDate::from_ymd_opt(2029, 1, 1).unwrap();
    let mut rng = Lcg(seed);
    let mut stats = ClientStats::default();

    for _ in 0..ATTEMPTS_PER_CLIENT {
        let pid = properties[rng.next() as usize % properties.len()];
        let check_in = base + Days::new(rng.next() % 365);
        let stay = Stay::new(check_in, check_in + Days::new(1 + rng.next() % 7));

        let t = Instant::now();
        let _ = engine.check_availability(pid, stay).await;
        stats.check.push(t.elapsed());

        let req = BookingRequest::new(pid, Ulid::new(), stay).submitted_on(submitted);
        let t = Instant::now();
        match engine.reserve_request(req).await {
            Ok(_) => stats.created += 1,
            Err(EngineError::Conflict(_)) => stats.conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
        stats.reserve.push(t.elapsed());
    }
    stats
}

fn main() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    rt.block_on(async {
        let dir = std::env::temp_dir().join(format!("stayline_bench_{}", Ulid::new()));
        std::fs::create_dir_all(&dir).expect("bench dir");
        let engine = Arc::new(
            Engine::new(dir.join("bookings.journal"), Arc::new(BookingFeed::new())).expect("engine"),
        );

        let mut ids = Vec::with_capacity(PROPERTIES);
        for _ in 0..PROPERTIES {
            let p = Property {
                id: Ulid::new(),
                owner_id: Ulid::new(),
                nightly_price: 10_000,
            };
            ids.push(p.id);
            engine.register_property(p).await.expect("register");
        }
        let ids = Arc::new(ids);

        println!("stayline stress: {PROPERTIES} properties, {CLIENTS} clients x {ATTEMPTS_PER_CLIENT} attempts");
        let started = Instant::now();
        let handles: Vec<_> = (0..CLIENTS)
            .map(|i| tokio::spawn(client(engine.clone(), ids.clone(), i as u64 + 1)))
            .collect();

        let mut all = ClientStats::default();
        for h in handles {
            let s = h.await.expect("client panicked");
            all.reserve.extend(s.reserve);
            all.check.extend(s.check);
            all.created += s.created;
            all.conflicts += s.conflicts;
        }
        let elapsed = started.elapsed();

        let total = CLIENTS * ATTEMPTS_PER_CLIENT;
        println!(
            "  {total} reservations in {:.2}s ({:.0}/s): {} created, {} conflicts",
            elapsed.as_secs_f64(),
            total as f64 / elapsed.as_secs_f64(),
            all.created,
            all.conflicts
        );
        print_latency("check_availability", &mut all.check);
        print_latency("reserve", &mut all.reserve);

        // Verify the invariant held under load.
        for pid in ids.iter() {
            let active: Vec<_> = engine
                .bookings(*pid)
                .await
                .expect("bookings")
                .into_iter()
                .filter(Booking::is_active)
                .collect();
            for w in active.windows(2) {
                assert!(!w[0].stay.overlaps(&w[1].stay), "overlap on {pid}");
            }
        }
        println!("  invariant verified on {PROPERTIES} properties");

        let _ = std::fs::remove_dir_all(&dir);
    });
}
