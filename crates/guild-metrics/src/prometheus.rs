//! Prometheus text exposition format.
//!
//! Renders the latest period snapshot, the pool read model, and the alarm
//! states for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use guild_state::{AlarmRecord, AlarmState, MetricsSnapshot, PoolStatus};

const PREFIX: &str = "guild_hello";

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
    let _ = writeln!(out, "# TYPE {PREFIX}_{name} {kind}");
}

/// Render the service's operational state into Prometheus text format.
///
/// Latency gauges are omitted for a period that had no latency samples.
pub fn render_prometheus(
    snapshot: Option<&MetricsSnapshot>,
    pool: Option<&PoolStatus>,
    alarms: &[AlarmRecord],
) -> String {
    let mut out = String::new();

    if let Some(s) = snapshot {
        let counts = [
            ("invocations", "Invocations in the last closed period.", s.invocations),
            ("errors", "Handler faults in the last closed period.", s.errors),
            ("timeouts", "Invocations aborted by timeout in the last closed period.", s.timeouts),
            ("cold_starts", "Invocations without a warm slot in the last closed period.", s.cold_starts),
        ];
        for (name, help, value) in counts {
            header(&mut out, name, "gauge", help);
            let _ = writeln!(out, "{PREFIX}_{name} {value}");
        }

        for (quantile, value) in [("0.5", s.latency_p50_ms), ("0.95", s.latency_p95_ms)] {
            if let Some(v) = value {
                if quantile == "0.5" {
                    header(&mut out, "latency_ms", "gauge", "Invocation latency in milliseconds.");
                }
                let _ = writeln!(out, "{PREFIX}_latency_ms{{quantile=\"{quantile}\"}} {v:.2}");
            }
        }

        header(&mut out, "peak_concurrency", "gauge", "Peak in-flight invocations in the last closed period.");
        let _ = writeln!(out, "{PREFIX}_peak_concurrency {}", s.peak_concurrency);
        header(&mut out, "utilization_percent", "gauge", "Peak concurrency over provisioned capacity.");
        let _ = writeln!(out, "{PREFIX}_utilization_percent {:.2}", s.utilization_percent());
    }

    if let Some(p) = pool {
        header(&mut out, "provisioned_capacity", "gauge", "Currently provisioned execution slots.");
        let _ = writeln!(out, "{PREFIX}_provisioned_capacity {}", p.current_capacity);
        header(&mut out, "capacity_bounds", "gauge", "Configured capacity bounds.");
        let _ = writeln!(out, "{PREFIX}_capacity_bounds{{bound=\"min\"}} {}", p.min_capacity);
        let _ = writeln!(out, "{PREFIX}_capacity_bounds{{bound=\"max\"}} {}", p.max_capacity);
    }

    header(&mut out, "alarm_state", "gauge", "1 when the alarm is in ALARM, 0 when OK.");
    for a in alarms {
        let firing = u8::from(a.state == AlarmState::Alarm);
        let _ = writeln!(out, "{PREFIX}_alarm_state{{alarm=\"{}\"}} {firing}", a.name);
    }

    out
}
