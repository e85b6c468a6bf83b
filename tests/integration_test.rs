use sentinel_agent::sim::{MissingMap, SimulatedHost};
use sentinel_common::{observe_frame, Verdict};
use sentinel_xdp::cli::commands::run_simulation;
use sentinel_xdp::error::{Result, SentinelError};

#[test]
fn test_error_types() {
    let err = SentinelError::MapReadFailed("/sys/fs/bpf/sentinel/packet_cnt".to_string());
    assert!(err.to_string().contains("packet_cnt"));

    let err: SentinelError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, SentinelError::IoError(_)));
}

#[test]
fn test_version_const() {
    assert!(!sentinel_xdp::VERSION.is_empty());
}

#[test]
fn test_frames_on_one_cpu_add_exactly() {
    let attachment = SimulatedHost::new(4).attach();
    attachment.deliver_on(2, 10);
    let before = attachment.snapshot().per_cpu()[2];

    let report = attachment.deliver_on(2, 1234);

    assert_eq!(attachment.snapshot().per_cpu()[2], before + 1234);
    assert_eq!(report.delivered, 1234);
}

#[test]
fn test_every_verdict_is_pass() {
    let attachment = SimulatedHost::new(3).attach();
    for frame in 0..300 {
        assert_eq!(attachment.deliver(frame % 3), Verdict::Pass);
    }
}

#[test]
fn test_concurrent_delivery_never_loses_counts() {
    let attachment = SimulatedHost::new(8).attach();
    attachment.deliver_round_robin(16);
    let before = attachment.snapshot().total();

    let distribution = [50_000, 1, 0, 12_345, 7, 20_000, 3, 999];
    let report = attachment.deliver_concurrently(&distribution);

    let expected: u64 = distribution.iter().sum();
    assert_eq!(report.delivered, expected);
    assert!(report.all_passed());
    assert_eq!(attachment.snapshot().total(), before + expected);
}

#[test]
fn test_lookup_miss_is_silent() {
    for _ in 0..10 {
        assert_eq!(observe_frame(&MissingMap), Verdict::Pass);
    }
}

#[test]
fn test_attach_round_robin_detach() {
    let attachment = SimulatedHost::new(4).attach();
    let report = attachment.deliver_round_robin(1000);
    let snapshot = attachment.detach();

    assert_eq!(report.passed, 1000);
    assert_eq!(snapshot.total(), 1000);
    assert_eq!(snapshot.per_cpu(), &[250, 250, 250, 250]);
}

#[test]
fn test_skewed_distribution_sums_exactly() {
    let attachment = SimulatedHost::new(4).attach();
    attachment.deliver_concurrently(&[997, 1, 2, 0]);
    let snapshot = attachment.detach();

    assert_eq!(snapshot.total(), 1000);
    assert_eq!(snapshot.per_cpu().iter().sum::<u64>(), 1000);
}

#[test]
fn test_reattach_starts_from_zero() {
    let host = SimulatedHost::new(4);

    let first = host.attach();
    first.deliver_round_robin(1000);
    assert_eq!(first.detach().total(), 1000);

    let second = host.attach();
    assert_eq!(second.snapshot().total(), 0);
    second.deliver_round_robin(1000);
    let snapshot = second.detach();
    assert_eq!(snapshot.total(), 1000);
    assert_eq!(snapshot.per_cpu(), &[250, 250, 250, 250]);
}

#[test]
fn test_simulate_command_metrics() -> Result<()> {
    let metrics = run_simulation(1000, 4, true)?;
    assert_eq!(metrics.packets_total, 1000);
    assert_eq!(metrics.cpus, 4);
    assert_eq!(metrics.per_cpu.iter().sum::<u64>(), 1000);

    let verdicts = metrics.verdicts.expect("simulation records verdicts");
    assert_eq!(verdicts.delivered, 1000);
    assert_eq!(verdicts.passed, 1000);
    Ok(())
}
