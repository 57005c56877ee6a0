use std::hint::black_box;
use std::time::Duration;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use http::HeaderMap;
use http::HeaderValue;
use sb_ratelimit::CallBuckets;
use sb_ratelimit::QuotaTracker;
use sb_ratelimit::QuotaWindow;
use sb_ratelimit::parse_headers;
use tokio::time::Instant;

fn riot_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-app-rate-limit", HeaderValue::from_static("20:1,100:120"));
    headers.insert("x-app-rate-limit-count", HeaderValue::from_static("5:1,40:120"));
    headers.insert("x-method-rate-limit", HeaderValue::from_static("2000:10"));
    headers.insert("x-method-rate-limit-count", HeaderValue::from_static("12:10"));
    headers
}

fn bench_parse_headers(c: &mut Criterion) {
    let headers = riot_headers();

    c.bench_function("parse riot headers", |b| b.iter(|| parse_headers(black_box(&headers), Instant::now())));
}

fn bench_tracker(c: &mut Criterion) {
    let tracker = QuotaTracker::new();
    let buckets = CallBuckets::new("na1", "summoner-v4.by-puuid");
    tracker.reconcile(&buckets.method, &[QuotaWindow::new(u32::MAX, Duration::from_secs(10))], &[]);

    c.bench_function("try_reserve + release", |b| {
        b.iter(|| {
            if let Ok(reservation) = tracker.try_reserve(black_box(&buckets)) {
                tracker.release(reservation);
            }
        })
    });

    let parsed = parse_headers(&riot_headers(), Instant::now()).unwrap();
    c.bench_function("try_reserve + settle", |b| {
        b.iter(|| {
            if let Ok(reservation) = tracker.try_reserve(black_box(&buckets)) {
                tracker.settle(reservation, black_box(&parsed));
            }
        })
    });
}

criterion_group!(benches, bench_parse_headers, bench_tracker);
criterion_main!(benches);
