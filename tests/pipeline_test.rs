//! End-to-end pipeline runs over in-memory collaborators.

mod common;

use std::time::Duration;

use cluster_testbed::experiment::{ExperimentRequest, ExperimentStatus};
use cluster_testbed::Error;

use common::{harness, line_topology, wait_terminal, FakeConsole, FakeControlPlane, FakeRemote, FIRST_CONSOLE_PORT};

async fn drain(observer: &mut cluster_testbed::broadcast::Subscription) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(200), observer.recv()).await {
        lines.push(line);
    }
    lines
}

fn parse_status(line: &str) -> Option<ExperimentStatus> {
    let word = line.rsplit(": ").next()?.split_whitespace().next()?;
    serde_json::from_value(serde_json::Value::String(word.to_string())).ok()
}

// ============================================================================
// Scenario A: three guests, simple placement
// ============================================================================

#[tokio::test]
async fn test_three_guests_simple_strategy() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    h.topologies.insert(line_topology("trio"));

    let id = h
        .coordinator
        .start(ExperimentRequest::new("trio").strategy("simple"))
        .await
        .unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    assert_eq!(record.status(), ExperimentStatus::Completed);
    let result = record.result().unwrap();
    assert_eq!(result.mapping.len(), 3);
    assert_eq!(result.mapping[&0], "10.0.0.1");
    assert_eq!(result.mapping[&2], "10.0.0.3");
    assert!(result.elapsed_seconds >= 0.0);
    assert_eq!(result.stdout, "Hello from rank 0\n");
    assert_eq!(result.provisioning.hosts().len(), 3);

    for host in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        assert_eq!(
            h.remote.file(host, "/tmp/mpi_experiment/rankfile").as_deref(),
            Some("rank 0=10.0.0.1 slot=0\nrank 1=10.0.0.2 slot=0\nrank 2=10.0.0.3 slot=0")
        );
        assert_eq!(
            h.remote.file(host, "/tmp/mpi_experiment/hostfile").as_deref(),
            Some("10.0.0.1\n10.0.0.2\n10.0.0.3")
        );
    }

    let state = h.remote.state.lock();
    assert_eq!(state.commands.len(), 1);
    let (master, command) = &state.commands[0];
    assert_eq!(master, "10.0.0.1");
    assert!(command.contains("-np 3 --rankfile '/tmp/mpi_experiment/rankfile'"));
}

// ============================================================================
// Scenario B: unknown topology
// ============================================================================

#[tokio::test]
async fn test_unknown_topology_fails_without_result() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    let mut observer = h.coordinator.broadcaster().subscribe();

    let id = h.coordinator.start(ExperimentRequest::new("nowhere")).await.unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    assert_eq!(record.status(), ExperimentStatus::Failed);
    assert!(record.result().is_none());
    assert_eq!(record.topology(), "nowhere");
    assert_eq!(h.control_plane.call_count(), 0);

    let lines = drain(&mut observer).await;
    let last = lines.last().unwrap();
    assert!(last.contains(&format!("Experiment {id}: failed")));
    assert!(last.contains("not_found"));
}

#[tokio::test]
async fn test_unknown_experiment_is_not_found() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    assert!(matches!(h.coordinator.get(99).await, Err(Error::NotFound(_))));
}

// ============================================================================
// Scenario C: concurrent experiments
// ============================================================================

#[tokio::test]
async fn test_concurrent_experiments_are_independent() {
    let h = harness(
        FakeControlPlane::with_latency(Duration::from_millis(5)),
        FakeConsole::new(),
        FakeRemote::new(),
    );
    h.topologies.insert(line_topology("left"));

    let (a, b) = tokio::join!(
        h.coordinator.start(ExperimentRequest::new("left")),
        h.coordinator.start(ExperimentRequest::new("right")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);
    let (first, second) = (a.min(b), a.max(b));
    assert_eq!(second, first + 1);

    let left = wait_terminal(&h.coordinator, a).await;
    let right = wait_terminal(&h.coordinator, b).await;
    assert_eq!(left.status(), ExperimentStatus::Completed);
    assert_eq!(left.topology(), "left");
    assert_eq!(right.status(), ExperimentStatus::Failed);
    assert_eq!(right.topology(), "right");
}

#[tokio::test]
async fn test_mid_flight_status_is_per_experiment() {
    let (control_plane, gate) = FakeControlPlane::gated("project_held");
    let h = harness(control_plane, FakeConsole::new(), FakeRemote::new());
    h.topologies.insert(line_topology("held"));
    h.topologies.insert(line_topology("free"));

    let held = h.coordinator.start(ExperimentRequest::new("held")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), gate.entered.notified())
        .await
        .unwrap();

    let free = h.coordinator.start(ExperimentRequest::new("free")).await.unwrap();
    let free_record = wait_terminal(&h.coordinator, free).await;
    assert_eq!(free_record.status(), ExperimentStatus::Completed);
    assert_eq!(free_record.topology(), "free");

    let held_record = h.coordinator.get(held).await.unwrap();
    assert_eq!(held_record.status(), ExperimentStatus::Provisioning);
    assert!(held_record.result().is_none());
    assert_eq!(held_record.topology(), "held");

    gate.release.notify_one();
    let held_record = wait_terminal(&h.coordinator, held).await;
    assert_eq!(held_record.status(), ExperimentStatus::Completed);
    assert_eq!(h.coordinator.get(free).await.unwrap(), free_record);
}

#[tokio::test]
async fn test_ids_strictly_increase() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    let mut last = None;
    for _ in 0..5 {
        let id = h.coordinator.start(ExperimentRequest::new("missing")).await.unwrap();
        if let Some(prev) = last {
            assert!(id > prev);
        }
        last = Some(id);
    }
    let listed: Vec<u64> = h.coordinator.list().await.unwrap().iter().map(|r| r.id()).collect();
    assert_eq!(listed, vec![0, 1, 2, 3, 4]);
}

// ============================================================================
// Status broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_follows_success_path() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    h.topologies.insert(line_topology("trio"));
    let mut observer = h.coordinator.broadcaster().subscribe();

    let id = h.coordinator.start(ExperimentRequest::new("trio")).await.unwrap();
    wait_terminal(&h.coordinator, id).await;

    let mut lines = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(200), observer.recv()).await {
        lines.push(line);
    }
    assert!(lines[0].contains("started"));

    let statuses: Vec<ExperimentStatus> = lines.iter().filter_map(|l| parse_status(l)).collect();
    assert_eq!(statuses, ExperimentStatus::SUCCESS_PATH[1..].to_vec());
}

#[tokio::test]
async fn test_failure_broadcast_carries_no_detail() {
    let h = harness(
        FakeControlPlane::failing_on("create_project"),
        FakeConsole::new(),
        FakeRemote::new(),
    );
    h.topologies.insert(line_topology("trio"));
    let mut observer = h.coordinator.broadcaster().subscribe();

    let id = h.coordinator.start(ExperimentRequest::new("trio")).await.unwrap();
    let record = wait_terminal(&h.coordinator, id).await;
    assert_eq!(record.status(), ExperimentStatus::Failed);

    let mut lines = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(200), observer.recv()).await {
        lines.push(line);
    }
    let last = lines.last().unwrap();
    assert!(last.contains("failed during provisioning"));
    assert!(last.contains("upstream_unavailable"));
    assert!(!last.contains("boom"));
}

// ============================================================================
// Stage failures
// ============================================================================

#[tokio::test]
async fn test_no_addresses_fails_provisioning() {
    let failing = FakeConsole::failing([FIRST_CONSOLE_PORT, FIRST_CONSOLE_PORT + 1, FIRST_CONSOLE_PORT + 2]);
    let h = harness(FakeControlPlane::new(), failing, FakeRemote::new());
    h.topologies.insert(line_topology("trio"));

    let id = h.coordinator.start(ExperimentRequest::new("trio")).await.unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    assert_eq!(record.status(), ExperimentStatus::Failed);
    assert!(h.remote.state.lock().files.is_empty());
}

#[tokio::test]
async fn test_unknown_strategy_fails_placement() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    h.topologies.insert(line_topology("trio"));
    let mut observer = h.coordinator.broadcaster().subscribe();

    let id = h
        .coordinator
        .start(ExperimentRequest::new("trio").strategy("greedy"))
        .await
        .unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    assert_eq!(record.status(), ExperimentStatus::Failed);
    assert!(record.result().is_none());
    let mut saw_placement_failure = false;
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(200), observer.recv()).await {
        saw_placement_failure |= line.contains("failed during placing (invalid_input)");
    }
    assert!(saw_placement_failure);
    assert!(h.remote.state.lock().files.is_empty());
}

#[tokio::test]
async fn test_unreachable_host_aborts_distribution() {
    let h = harness(
        FakeControlPlane::new(),
        FakeConsole::new(),
        FakeRemote::with_unreachable(["10.0.0.2"]),
    );
    h.topologies.insert(line_topology("trio"));

    let id = h.coordinator.start(ExperimentRequest::new("trio")).await.unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    assert_eq!(record.status(), ExperimentStatus::Failed);
    let state = h.remote.state.lock();
    assert!(state.files.iter().all(|(host, _, _)| host == "10.0.0.1"));
    assert!(state.commands.is_empty());
}

#[tokio::test]
async fn test_random_strategy_uses_every_host_once() {
    let h = harness(FakeControlPlane::new(), FakeConsole::new(), FakeRemote::new());
    h.topologies.insert(line_topology("trio"));

    let id = h
        .coordinator
        .start(ExperimentRequest::new("trio").strategy("Random"))
        .await
        .unwrap();
    let record = wait_terminal(&h.coordinator, id).await;

    let mut hosts: Vec<String> = record.result().unwrap().mapping.values().cloned().collect();
    hosts.sort();
    assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
}
