//! Criterion benchmarks for controller line handling.
//!
//! A GRBL controller polled every 200 ms by several dashboards produces a
//! steady stream of status reports; these benchmarks track the per-line cost
//! of parsing, classifying and framing them.
//!
//! Run with:
//! ```bash
//! cargo bench --package grbl-core --bench status_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grbl_core::protocol::LineBuffer;
use grbl_core::{classify_response, parse_status_report, RuntimeState};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const FULL_REPORT: &str = "<Run|MPos:123.456,-78.900,1.250|WPos:23.456,21.100,1.250|FS:1500,12000>";
const SHORT_REPORT: &str = "<Idle|MPos:0.000,0.000,0.000|FS:0,0>";
const EXTENDED_REPORT: &str =
    "<Run|MPos:10.000,20.000,0.000|Bf:15,128|FS:1000,0|Ov:100,100,100|WCO:0.000,0.000,0.000>";
const MALFORMED_REPORT: &str = "<Jogging|MPos:1,2,3>";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_status_report");
    for (name, line) in [
        ("full", FULL_REPORT),
        ("short", SHORT_REPORT),
        ("extended", EXTENDED_REPORT),
        ("malformed", MALFORMED_REPORT),
        ("plain_ok", "ok"),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| parse_status_report(black_box(line)))
        });
    }
    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let report = parse_status_report(FULL_REPORT).expect("fixture parses");
    c.bench_function("apply_report", |b| {
        let mut state = RuntimeState::new("bench", false);
        b.iter(|| state.apply_report(black_box(&report)))
    });
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_response_mixed", |b| {
        b.iter(|| {
            for line in ["ok", FULL_REPORT, "error:20", "ALARM:1", "[MSG:Reset to continue]"] {
                black_box(classify_response(black_box(line)));
            }
        })
    });
}

fn bench_framing(c: &mut Criterion) {
    let mut chunk = Vec::new();
    for _ in 0..32 {
        chunk.extend_from_slice(FULL_REPORT.as_bytes());
        chunk.extend_from_slice(b"\r\nok\r\n");
    }
    c.bench_function("line_buffer_64_lines", |b| {
        b.iter(|| {
            let mut buf = LineBuffer::new();
            black_box(buf.push(black_box(&chunk)))
        })
    });
}

criterion_group!(benches, bench_parse, bench_apply, bench_classify, bench_framing);
criterion_main!(benches);
