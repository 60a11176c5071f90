//! Plain-text console reports

use crate::analyzer::{Analysis, SAMPLE_TRACE_IDS};
use crate::backends::bottleneck::{BottleneckReport, COMMON_ISSUES, NEXT_STEPS};
use crate::backends::{ProbeReport, ProbeStatus};
use crate::traffic::stats::{LatencySummary, RunReport};
use std::fmt::Write;

fn latency_line(summary: Option<LatencySummary>) -> String {
    match summary {
        Some(s) => format!(
            "min {:.2}ms  avg {:.2}ms  max {:.2}ms  p95 {:.2}ms",
            s.min, s.avg, s.max, s.p95
        ),
        None => "no latency data".to_string(),
    }
}

/// Per-endpoint counters and latencies of one run
pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", report.name);
    let _ = writeln!(
        out,
        "Elapsed: {:.1}s  Units submitted: {}  Requests: {}  Errors: {}{}",
        report.elapsed.as_secs_f64(),
        report.submitted,
        report.total_requests(),
        report.total_errors(),
        if report.stopped_early {
            "  (stopped early)"
        } else {
            ""
        }
    );

    for (label, stats) in &report.endpoints {
        let _ = writeln!(out, "\n{}", label);
        let _ = writeln!(
            out,
            "  requests {}  errors {} ({:.1}%)  transport failures {}",
            stats.requests,
            stats.errors,
            stats.error_rate() * 100.0,
            stats.transport_failures
        );
        if !stats.status_counts.is_empty() {
            let statuses: Vec<String> = stats
                .status_counts
                .iter()
                .map(|(status, count)| format!("{}: {}", status, count))
                .collect();
            let _ = writeln!(out, "  status {}", statuses.join(", "));
        }
        let _ = writeln!(out, "  {}", latency_line(stats.summary()));
    }

    if report.endpoints.len() > 1 {
        let _ = writeln!(out, "\nOverall: {}", latency_line(report.overall_summary()));
    }
    out
}

/// Sequential benchmark results, one block per endpoint
pub fn render_analysis(analysis: &Analysis, jaeger_url: &str) -> String {
    let mut out = String::new();
    for timing in &analysis.endpoints {
        let _ = writeln!(out, "=== {} {} ===", timing.method, timing.label);
        let _ = writeln!(
            out,
            "  requests {}  no response {}",
            timing.statuses.len() + timing.failures,
            timing.failures
        );
        let _ = writeln!(out, "  {}", latency_line(timing.summary()));
    }
    if analysis.stopped_early {
        out.push_str("(stopped early)\n");
    }

    let samples: Vec<&str> = analysis.trace_ids().take(SAMPLE_TRACE_IDS).collect();
    if !samples.is_empty() {
        out.push_str("\nSample trace IDs for further analysis:\n");
        for (index, trace_id) in samples.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", index + 1, trace_id);
        }
        let _ = writeln!(out, "\nTo view traces, go to: {}", jaeger_url);
    }
    out
}

/// One probe's lines with their details indented
pub fn render_probe(report: &ProbeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", report.name);
    for line in &report.lines {
        let _ = writeln!(out, "[{}] {}", line.status, line.message);
        for detail in &line.details {
            let _ = writeln!(out, "       {}", detail);
        }
    }
    let _ = writeln!(
        out,
        "-- {} passed, {} warnings, {} failed",
        report.count(ProbeStatus::Pass),
        report.count(ProbeStatus::Warn),
        report.count(ProbeStatus::Fail)
    );
    out
}

/// Overall verdict for several probes
pub fn render_probe_summary(reports: &[ProbeReport]) -> String {
    let mut out = String::from("=== Summary ===\n");
    for report in reports {
        let verdict = if report.has_failures() {
            "FAILED"
        } else {
            "OK"
        };
        let _ = writeln!(out, "{}: {}", report.name, verdict);
    }
    let failed = reports.iter().filter(|r| r.has_failures()).count();
    if failed == 0 {
        out.push_str("All observability checks passed\n");
    } else {
        let _ = writeln!(out, "{} of {} checks failed", failed, reports.len());
    }
    out
}

fn numbered(out: &mut String, title: &str, items: &[&str]) {
    let _ = writeln!(out, "\n=== {} ===", title);
    for (index, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", index + 1, item);
    }
}

pub fn render_bottlenecks(report: &BottleneckReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Prometheus URL: {}", report.prometheus_url);
    let _ = writeln!(out, "Jaeger URL: {}", report.jaeger_url);

    for section in &report.sections {
        let _ = writeln!(out, "\n=== {} ===", section.title);
        for line in &section.lines {
            let _ = writeln!(out, "{}", line);
        }
        if let Some(recommendation) = &section.recommendation {
            let _ = writeln!(out, "\nRecommendation: {}", recommendation);
        }
    }

    numbered(&mut out, "Common Performance Issues & Solutions", COMMON_ISSUES);
    numbered(&mut out, "Next Steps", NEXT_STEPS);
    out
}
