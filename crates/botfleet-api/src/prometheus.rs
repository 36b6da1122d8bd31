//! Prometheus text exposition format.
//!
//! Renders the controller's status snapshot for scraping by a Prometheus
//! server or compatible agent.

use std::fmt::Write;

use botfleet_controller::FleetStatus;
use botfleet_core::CyclePhase;

const PHASES: [CyclePhase; 4] = [
    CyclePhase::Idle,
    CyclePhase::Sampling,
    CyclePhase::Deciding,
    CyclePhase::Ramping,
];

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Render a status snapshot into Prometheus text format.
pub fn render_prometheus(status: &FleetStatus) -> String {
    let mut out = String::new();

    header(&mut out, "botfleet_workers", "Workers per inventory set.", "gauge");
    let _ = writeln!(out, "botfleet_workers{{state=\"running\"}} {}", status.running_count);
    let _ = writeln!(out, "botfleet_workers{{state=\"disabled\"}} {}", status.disabled_count);

    header(&mut out, "botfleet_workers_total", "Workers discovered at startup.", "gauge");
    let _ = writeln!(out, "botfleet_workers_total {}", status.total_workers);

    header(&mut out, "botfleet_max_workers", "Configured running worker limit.", "gauge");
    let _ = writeln!(out, "botfleet_max_workers {}", status.max_workers);

    header(&mut out, "botfleet_hosts", "Configured hosts.", "gauge");
    let _ = writeln!(out, "botfleet_hosts {}", status.hosts);
    header(&mut out, "botfleet_hosts_failed", "Hosts whose discovery failed.", "gauge");
    let _ = writeln!(out, "botfleet_hosts_failed {}", status.failed_hosts.len());

    header(&mut out, "botfleet_cycle_phase", "Current control cycle phase.", "gauge");
    for phase in PHASES {
        let active = u8::from(status.phase == phase);
        let _ = writeln!(out, "botfleet_cycle_phase{{phase=\"{phase}\"}} {active}");
    }

    header(&mut out, "botfleet_cycles_completed_total", "Completed control cycles.", "counter");
    let _ = writeln!(out, "botfleet_cycles_completed_total {}", status.cycles_completed);
    header(
        &mut out,
        "botfleet_cycles_rejected_total",
        "Cycle requests rejected because one was already running.",
        "counter",
    );
    let _ = writeln!(out, "botfleet_cycles_rejected_total {}", status.cycles_rejected);

    if let Some(decision) = status.last_cycle_decision {
        header(&mut out, "botfleet_target_workers", "Target from the last decision.", "gauge");
        let _ = writeln!(out, "botfleet_target_workers {}", decision.target_active);
    }

    if let Some(report) = &status.last_cycle {
        header(
            &mut out,
            "botfleet_last_cycle_operations",
            "Worker operations in the last cycle by outcome.",
            "gauge",
        );
        for (outcome, n) in [
            ("started", report.started),
            ("stopped", report.stopped),
            ("failed", report.failed),
            ("skipped", report.skipped),
            ("abandoned", report.abandoned),
        ] {
            let _ = writeln!(out, "botfleet_last_cycle_operations{{outcome=\"{outcome}\"}} {n}");
        }
    }

    if let Some(sample) = status.last_demand.and_then(|d| d.current) {
        header(&mut out, "botfleet_demand", "Last demand sample.", "gauge");
        let _ = writeln!(out, "botfleet_demand {}", sample.value);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::{DemandReading, DemandSample, ScalingDecision};

    fn test_status() -> FleetStatus {
        FleetStatus {
            policy: "sinusoidal".to_string(),
            max_workers: 50,
            hosts: 3,
            running_count: 12,
            disabled_count: 30,
            total_workers: 42,
            phase: CyclePhase::Ramping,
            cycles_completed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn renders_inventory_gauges() {
        let out = render_prometheus(&test_status());
        assert!(out.contains("# TYPE botfleet_workers gauge"));
        assert!(out.contains("botfleet_workers{state=\"running\"} 12"));
        assert!(out.contains("botfleet_workers{state=\"disabled\"} 30"));
        assert!(out.contains("botfleet_workers_total 42"));
        assert!(out.contains("botfleet_cycles_completed_total 7"));
    }

    #[test]
    fn exactly_one_phase_is_active() {
        let out = render_prometheus(&test_status());
        assert!(out.contains("botfleet_cycle_phase{phase=\"ramping\"} 1"));
        assert!(out.contains("botfleet_cycle_phase{phase=\"idle\"} 0"));
    }

    #[test]
    fn optional_series_appear_once_known() {
        let out = render_prometheus(&test_status());
        assert!(!out.contains("botfleet_target_workers"));
        assert!(!out.contains("botfleet_demand "));

        let mut status = test_status();
        status.last_cycle_decision = Some(ScalingDecision {
            target_active: 20,
            current_active: 12,
            to_start: 8,
            to_stop: 0,
        });
        status.last_demand = Some(DemandReading {
            current: Some(DemandSample::new(311, chrono::Utc::now())),
            previous: None,
            fresh: true,
        });
        let out = render_prometheus(&status);
        assert!(out.contains("botfleet_target_workers 20"));
        assert!(out.contains("botfleet_demand 311"));
    }
}
