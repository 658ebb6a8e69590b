//! Benchmarks for hostlb components.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use futures::future::BoxFuture;
use futures::FutureExt;
use hostlb::config::{Algorithm, LoadBalancerConfig};
use hostlb::executor::ManualExecutor;
use hostlb::health::{HealthError, HealthProbe};
use hostlb::{DiscoveryEvent, LoadBalancerCore, Outcome};
use std::net::SocketAddr;
use std::sync::Arc;

struct NoProbe;

impl HealthProbe<SocketAddr> for NoProbe {
    fn probe(&self, _address: &SocketAddr) -> BoxFuture<'static, Result<(), HealthError>> {
        async { Ok(()) }.boxed()
    }
}

fn addr(i: usize) -> SocketAddr {
    format!("127.0.0.1:{}", 9000 + i).parse().unwrap()
}

fn create_lb(algorithm: Algorithm, num_hosts: usize) -> LoadBalancerCore<SocketAddr> {
    let lb = LoadBalancerCore::<SocketAddr>::builder(
        Arc::new(NoProbe),
        Arc::new(ManualExecutor::new()),
    )
    .load_balancer(LoadBalancerConfig {
        algorithm,
        ..LoadBalancerConfig::default()
    })
    .build();
    let events: Vec<_> = (0..num_hosts).map(|i| DiscoveryEvent::available(addr(i))).collect();
    lb.on_discovery_events(&events);
    lb
}

fn benchmark_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    group.throughput(Throughput::Elements(1));

    for (name, algorithm) in [
        ("round_robin", Algorithm::RoundRobin),
        ("least_connections", Algorithm::LeastConnections),
        ("p2c", Algorithm::PowerOfTwoChoices),
    ] {
        let lb = create_lb(algorithm, 10);
        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(lb.select().ok());
            })
        });
    }

    group.finish();
}

fn benchmark_select_large(c: &mut Criterion) {
    let lb = create_lb(Algorithm::LeastConnections, 100);

    c.bench_function("least_connections_select_100", |b| {
        b.iter(|| {
            black_box(lb.select().ok());
        })
    });
}

fn benchmark_report_outcome(c: &mut Criterion) {
    let lb = create_lb(Algorithm::RoundRobin, 10);
    let host = addr(3);

    c.bench_function("report_outcome_success", |b| {
        b.iter(|| {
            lb.report_outcome(black_box(&host), Outcome::Success);
        })
    });
}

fn benchmark_connection_tracking(c: &mut Criterion) {
    let lb = create_lb(Algorithm::LeastConnections, 10);
    let host = addr(5);

    c.bench_function("connection_open_close", |b| {
        b.iter(|| {
            lb.report_connection_opened(black_box(&host));
            lb.report_connection_closed(black_box(&host));
        })
    });
}

fn benchmark_reconcile(c: &mut Criterion) {
    let lb = create_lb(Algorithm::RoundRobin, 10);
    let swap_out: Vec<_> = vec![DiscoveryEvent::unavailable(addr(0))];
    let swap_in: Vec<_> = vec![DiscoveryEvent::available(addr(0))];

    c.bench_function("reconcile_remove_add", |b| {
        b.iter(|| {
            black_box(lb.on_discovery_events(&swap_out));
            black_box(lb.on_discovery_events(&swap_in));
        })
    });
}

criterion_group!(
    benches,
    benchmark_select,
    benchmark_select_large,
    benchmark_report_outcome,
    benchmark_connection_tracking,
    benchmark_reconcile,
);

criterion_main!(benches);
