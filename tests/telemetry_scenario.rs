//! Telemetry-driven selection end to end, using the in-process broker.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use dash_balancer::config::{LoadWeights, StrategyKind};
use dash_balancer::health::HealthState;
use dash_balancer::load_balancer::backend::{BackendId, TelemetrySample};
use dash_balancer::load_balancer::{LeastLoaded, RoundRobin, SelectionStrategy};
use dash_balancer::telemetry::{encode_sample, Broker, MemoryBroker};

mod common;

const TOPIC: &str = "loadbalancer/metrics";

/// Publish a sample for each `(backend, memory)` pair every 30ms.
fn spawn_publisher(broker: MemoryBroker, loads: Vec<(SocketAddr, f64)>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            for (addr, memory) in &loads {
                let sample = TelemetrySample {
                    memory: *memory,
                    disk_read: 0.1,
                    active_requests: 1,
                    observed_at: SystemTime::now(),
                };
                let payload = encode_sample(&BackendId::new(addr.to_string()), &sample);
                let _ = broker.publish(TOPIC, payload).await;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
}

/// Connect through the balancer and read which backend answered.
async fn served_by(balancer: SocketAddr) -> String {
    let mut client = TcpStream::connect(balancer).await.unwrap();
    let mut name = String::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_string(&mut name))
        .await
        .expect("backend answered")
        .unwrap();
    name
}

async fn naming_backends(n: usize) -> Vec<SocketAddr> {
    let mut addrs = Vec::with_capacity(n);
    for _ in 0..n {
        addrs.push(common::start_naming_backend().await);
    }
    addrs
}

#[tokio::test]
async fn silent_backend_becomes_unreachable_and_is_never_selected() {
    let backends = naming_backends(8).await;
    let silent = backends[7];
    let balancer = common::TestBalancer::start(common::test_config(&backends)).await;

    let broker = balancer.broker.clone();
    common::eventually(|| broker.subscriber_count(TOPIC) == 1).await;
    let loads = backends[..7].iter().map(|a| (*a, 0.2)).collect();
    let publisher = spawn_publisher(balancer.broker.clone(), loads);

    // Unreachable threshold is 300ms; the sweep runs every 20ms.
    let registry = balancer.registry.clone();
    let silent_id = BackendId::new(silent.to_string());
    common::eventually(|| {
        registry
            .snapshot()
            .get(&silent_id)
            .is_some_and(|r| r.health == HealthState::Unreachable)
    })
    .await;

    let snapshot = registry.snapshot();
    for record in snapshot.iter() {
        if record.id == silent_id {
            assert_eq!(record.health, HealthState::Unreachable);
        } else {
            assert_eq!(record.health, HealthState::Healthy, "{} should be healthy", record.id);
        }
    }

    let round_robin = RoundRobin::new();
    let least_loaded = LeastLoaded::new(LoadWeights::default());
    for _ in 0..100 {
        assert_ne!(round_robin.pick(&snapshot), Some(silent_id.clone()));
        assert_ne!(least_loaded.pick(&snapshot), Some(silent_id.clone()));
    }

    // Live sessions (round-robin) cover the seven reporting backends only.
    let mut seen = HashSet::new();
    for _ in 0..14 {
        seen.insert(served_by(balancer.addr).await);
    }
    assert_eq!(seen.len(), 7);
    assert!(!seen.contains(&silent.to_string()));

    publisher.abort();
    balancer.stop().await;
}

#[tokio::test]
async fn least_loaded_routes_to_lowest_score() {
    let backends = naming_backends(3).await;
    let mut config = common::test_config(&backends);
    config.strategy.kind = StrategyKind::LeastLoaded;
    let balancer = common::TestBalancer::start(config).await;

    let broker = balancer.broker.clone();
    common::eventually(|| broker.subscriber_count(TOPIC) == 1).await;
    let loads = vec![(backends[0], 0.9), (backends[1], 0.1), (backends[2], 0.5)];
    let publisher = spawn_publisher(balancer.broker.clone(), loads);

    let registry = balancer.registry.clone();
    common::eventually(|| registry.snapshot().iter().all(|r| r.health == HealthState::Healthy)).await;

    for _ in 0..5 {
        assert_eq!(served_by(balancer.addr).await, backends[1].to_string());
    }

    publisher.abort();
    balancer.stop().await;
}

#[tokio::test]
async fn stale_backend_leaves_sampled_pool_then_round_robin() {
    let backends = naming_backends(2).await;
    let balancer = common::TestBalancer::start(common::test_config(&backends)).await;

    let broker = balancer.broker.clone();
    common::eventually(|| broker.subscriber_count(TOPIC) == 1).await;
    // Only the second backend keeps reporting; the first reports once.
    let first = BackendId::new(backends[0].to_string());
    let once = TelemetrySample {
        memory: 0.0,
        disk_read: 0.0,
        active_requests: 0,
        observed_at: SystemTime::now(),
    };
    balancer.broker.publish(TOPIC, encode_sample(&first, &once)).await.unwrap();
    let publisher = spawn_publisher(balancer.broker.clone(), vec![(backends[1], 0.8)]);

    let registry = balancer.registry.clone();
    common::eventually(|| registry.snapshot().get(&first).is_some_and(|r| r.health == HealthState::Stale)).await;

    // Stale: excluded from the sampled pool even though its last load was lower.
    let snapshot = registry.snapshot();
    let least_loaded = LeastLoaded::new(LoadWeights::default());
    assert_eq!(least_loaded.pick(&snapshot).unwrap().as_str(), backends[1].to_string());
    // Round-robin still serves it until it turns Unreachable.
    let round_robin = RoundRobin::new();
    let picks: HashSet<_> = (0..4).filter_map(|_| round_robin.pick(&snapshot)).collect();
    assert!(picks.contains(&first));

    common::eventually(|| {
        registry
            .snapshot()
            .get(&first)
            .is_some_and(|r| r.health == HealthState::Unreachable)
    })
    .await;
    let snapshot = registry.snapshot();
    for _ in 0..4 {
        assert_ne!(round_robin.pick(&snapshot), Some(first.clone()));
    }

    publisher.abort();
    balancer.stop().await;
}

#[tokio::test]
async fn ingest_survives_broker_outage() {
    let backends = naming_backends(1).await;
    let balancer = common::TestBalancer::start(common::test_config(&backends)).await;
    let id = BackendId::new(backends[0].to_string());

    let broker = balancer.broker.clone();
    common::eventually(|| broker.subscriber_count(TOPIC) == 1).await;
    broker.disconnect();

    // While offline the record ages out.
    let registry = balancer.registry.clone();
    common::eventually(|| registry.snapshot().get(&id).is_some_and(|r| r.health == HealthState::Unreachable)).await;

    broker.reconnect();
    common::eventually(|| broker.subscriber_count(TOPIC) == 1).await;
    let publisher = spawn_publisher(broker.clone(), vec![(backends[0], 0.3)]);
    common::eventually(|| registry.snapshot().get(&id).is_some_and(|r| r.health == HealthState::Healthy)).await;

    assert_eq!(served_by(balancer.addr).await, backends[0].to_string());

    publisher.abort();
    balancer.stop().await;
}
