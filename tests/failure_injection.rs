//! Failure injection tests for the balancer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use machine_balancer::config::{CircuitBreakerConfig, HealthCheckConfig};
use machine_balancer::error::{FAILED_AFTER_RETRIES, NO_MACHINES_AVAILABLE};
use machine_balancer::health::{HealthMonitor, Prober};
use machine_balancer::load_balancer::{MachineId, MachineRegistry, Registration};
use machine_balancer::resilience::{BreakerPolicy, CircuitState, MachineStatus};

mod common;

fn id_of(addr: std::net::SocketAddr) -> MachineId {
    MachineId::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn test_success_passes_through() {
    let backend = common::start_programmable_backend(|path| async move {
        (201, format!("created {}", path))
    })
    .await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client()
        .post(balancer.url("/orders?id=7"))
        .header("origin", "http://app.example")
        .body("payload")
        .send()
        .await
        .expect("Balancer unreachable");

    assert_eq!(res.status(), 201);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.text().await.unwrap(), "created /orders?id=7");

    let machine = balancer.registry.get(&id_of(backend)).unwrap();
    assert_eq!(machine.connections(), 0);
    assert_eq!(machine.failure_count(), 0);
}

#[tokio::test]
async fn test_retry_on_same_machine() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "Success".into())
            }
        }
    })
    .await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 200, "Should succeed on the third attempt");
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    // The final success resets the consecutive failure count.
    let machine = balancer.registry.get(&id_of(backend)).unwrap();
    assert_eq!(machine.failure_count(), 0);
    assert_eq!(machine.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_failover_to_second_machine() {
    let failing_calls = Arc::new(AtomicU32::new(0));
    let fc = failing_calls.clone();
    let failing = common::start_programmable_backend(move |_| {
        let fc = fc.clone();
        async move {
            fc.fetch_add(1, Ordering::SeqCst);
            (500, "boom".into())
        }
    })
    .await;
    let healthy = common::start_mock_backend("b2").await;

    // Equal load: the first registered machine is tried first.
    let mut config = common::test_config();
    config.machines.push(common::seed(failing, 10));
    config.machines.push(common::seed(healthy, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "b2");
    assert_eq!(failing_calls.load(Ordering::SeqCst), 3);

    let failed = balancer.registry.get(&id_of(failing)).unwrap();
    assert_eq!(failed.failure_count(), 3);
    assert_eq!(failed.connections(), 0);
}

#[tokio::test]
async fn test_preflight_is_answered_by_balancer() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let backend = common::start_programmable_backend(move |_| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, "ok".into())
        }
    })
    .await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, balancer.url("/orders"))
        .header("origin", "http://app.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let allowed = res.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    for name in ["origin", "x-requested-with", "content-type", "accept"] {
        assert!(allowed.contains(name), "{} missing from {}", name, allowed);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failover_budget_is_bounded() {
    let mut counters = Vec::new();
    let mut config = common::test_config();
    config.resilience.retry_attempts = 1;

    for _ in 0..6 {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let addr = common::start_programmable_backend(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                (500, "boom".into())
            }
        })
        .await;
        config.machines.push(common::seed(addr, 10));
        counters.push(calls);
    }
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), FAILED_AFTER_RETRIES);

    // One attempt on the first machine, one failover, then the budget is spent.
    let calls: Vec<u32> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(calls, vec![1, 1, 0, 0, 0, 0]);
}

#[tokio::test]
async fn test_dispatch_failures_open_breaker() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let backend = common::start_programmable_backend(move |_| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (500, "boom".into())
        }
    })
    .await;

    let mut config = common::breaker_config(3);
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;
    let client = common::client();

    let res = client.get(balancer.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), FAILED_AFTER_RETRIES);

    let machine = balancer.registry.get(&id_of(backend)).unwrap();
    assert_eq!(machine.state(), CircuitState::Open);
    assert_eq!(machine.status(), MachineStatus::Inactive);
    assert!(!machine.is_eligible());

    let res = client.get(balancer.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), NO_MACHINES_AVAILABLE);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "Open machine must not be called");
}

#[tokio::test]
async fn test_concurrent_failures_release_connections() {
    let mut backends = Vec::new();
    let mut config = common::test_config();
    for _ in 0..2 {
        let addr = common::start_programmable_backend(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            (502, "bad gateway".into())
        })
        .await;
        config.machines.push(common::seed(addr, 100));
        backends.push(addr);
    }
    let balancer = common::start_balancer(config).await;

    let client = common::client();
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let url = balancer.url("/");
        tasks.push(tokio::spawn(async move {
            client.get(&url).send().await.map(|res| res.status().as_u16())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 503);
    }

    for addr in backends {
        let machine = balancer.registry.get(&id_of(addr)).unwrap();
        assert_eq!(machine.connections(), 0, "{} leaked a connection", addr);
    }
}

#[tokio::test]
async fn test_single_failing_machine_exhausts_retries() {
    let backend = common::start_programmable_backend(|_| async { (500, "boom".into()) }).await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), FAILED_AFTER_RETRIES);

    let machine = balancer.registry.get(&id_of(backend)).unwrap();
    assert_eq!(machine.connections(), 0, "Connection guard must be released");
    assert_eq!(machine.failure_count(), 3);
}

#[tokio::test]
async fn test_client_errors_are_retried() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (404, "missing".into())
        }
    })
    .await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/nope")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_slow_machine_times_out() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "slow".into())
    })
    .await;

    let mut config = common::test_config();
    config.resilience.request_timeout_ms = 100;
    config.resilience.retry_attempts = 1;
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), FAILED_AFTER_RETRIES);
}

#[tokio::test]
async fn test_open_breakers_mean_no_machines() {
    let backend = common::start_mock_backend("ok").await;

    let mut config = common::test_config();
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let policy = BreakerPolicy {
        threshold: 1,
        reset_timeout: Duration::from_secs(60),
    };
    let machine = balancer.registry.get(&id_of(backend)).unwrap();
    machine.mark_failure(&policy);
    assert_eq!(machine.state(), CircuitState::Open);

    let res = common::client().get(balancer.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), NO_MACHINES_AVAILABLE);
}

#[tokio::test]
async fn test_empty_pool_is_unavailable() {
    let balancer = common::start_balancer(common::test_config()).await;

    let res = common::client().get(balancer.url("/anything")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), NO_MACHINES_AVAILABLE);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let backend = common::start_mock_backend("ok").await;

    let mut config = common::test_config();
    config.limits.max_body_bytes = 16;
    config.machines.push(common::seed(backend, 10));
    let balancer = common::start_balancer(config).await;

    let res = common::client()
        .post(balancer.url("/"))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
}

#[tokio::test]
async fn test_health_checks_open_and_recover() {
    let healthy = Arc::new(AtomicBool::new(false));
    let h = healthy.clone();
    let backend = common::start_programmable_backend(move |_| {
        let h = h.clone();
        async move {
            if h.load(Ordering::SeqCst) {
                (200, "ok".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let registry = Arc::new(MachineRegistry::new());
    let machine = registry
        .add(Registration::new(backend.ip().to_string(), backend.port(), 10))
        .unwrap();

    let breaker = CircuitBreakerConfig {
        threshold: 2,
        reset_timeout_ms: 0,
    };
    let monitor = HealthMonitor::new(
        registry.clone(),
        HealthCheckConfig::default(),
        &breaker,
        Prober::new("/health", Duration::from_millis(500)),
    );

    monitor.check_all().await;
    assert_eq!(machine.state(), CircuitState::Closed);
    assert_eq!(machine.failure_count(), 1);

    monitor.check_all().await;
    assert_eq!(machine.state(), CircuitState::Open);
    assert_eq!(machine.status(), MachineStatus::Inactive);
    assert_eq!(registry.list_eligible().count(), 0);

    healthy.store(true, Ordering::SeqCst);

    // Reset timeout elapsed: first success is the trial, second closes.
    monitor.check_all().await;
    assert_eq!(machine.state(), CircuitState::HalfOpen);
    assert_eq!(registry.list_eligible().count(), 0);

    monitor.check_all().await;
    assert_eq!(machine.state(), CircuitState::Closed);
    assert_eq!(machine.status(), MachineStatus::Active);
    assert_eq!(registry.list_eligible().count(), 1);
}

#[tokio::test]
async fn test_background_health_monitor_evicts() {
    let healthy = Arc::new(AtomicBool::new(true));
    let h = healthy.clone();
    let flaky = common::start_programmable_backend(move |path| {
        let h = h.clone();
        async move {
            if h.load(Ordering::SeqCst) {
                (200, "flaky".into())
            } else if path == "/health" {
                (500, "dead".into())
            } else {
                (200, "flaky".into())
            }
        }
    })
    .await;
    let steady = common::start_mock_backend("steady").await;

    let mut config = common::test_config();
    config.health_check.enabled = true;
    config.health_check.interval_ms = 50;
    config.circuit_breaker.threshold = 2;
    config.machines.push(common::seed(flaky, 10));
    config.machines.push(common::seed(steady, 10));
    let balancer = common::start_balancer(config).await;

    healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let flaky_machine = balancer.registry.get(&id_of(flaky)).unwrap();
    assert_eq!(flaky_machine.state(), CircuitState::Open);

    let client = common::client();
    for _ in 0..5 {
        let res = client.get(balancer.url("/")).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "steady");
    }
}
