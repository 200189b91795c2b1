use serde::{Deserialize, Serialize};

use super::mutant::{Mutant, Verdict, VerdictCounts};
use super::process::{ProcessOutcome, truncate_preview};
use super::scheduler::{DeliveryFailure, ScheduledRun};

/// Supported output formats for run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown summary.
    Markdown,
    /// JSON summary with all mutants inline.
    Json,
    /// SARIF format for GitHub Code Scanning.
    Sarif,
    /// JUnit XML format for CI systems.
    Junit,
}

/// Result of a completed mutation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Successful baseline outcome.
    pub baseline: ProcessOutcome,
    /// Verdict counts; they sum to the workload size.
    pub counts: VerdictCounts,
    /// Every mutant, in completion order.
    pub mutants: Vec<Mutant>,
    /// `MutantTested` deliveries that failed.
    pub delivery_failures: Vec<DeliveryFailure>,
}

impl RunReport {
    pub(crate) fn new(baseline: ProcessOutcome, scheduled: ScheduledRun) -> Self {
        let counts = scheduled.mutants.iter().map(Mutant::verdict).collect();
        Self {
            baseline,
            counts,
            mutants: scheduled.mutants,
            delivery_failures: scheduled.delivery_failures,
        }
    }

    /// Number of tested mutants.
    pub fn total(&self) -> usize {
        self.counts.total()
    }

    /// Mutation score indicator: detected (killed, timeout, error) / total, percentage.
    pub fn mutation_score_indicator(&self) -> f64 {
        percentage(self.counts.detected(), self.total())
    }

    /// Killed / total, percentage.
    pub fn kill_ratio(&self) -> f64 {
        percentage(self.counts.killed, self.total())
    }

    /// Mutants with the given verdict, in completion order.
    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &Mutant> {
        self.mutants.iter().filter(move |m| m.verdict() == verdict)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (part as f64) * 100.0 / (total as f64)
    }
}

/// Thresholds a completed run must meet. Unset thresholds always pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    /// Minimum mutation score indicator, percentage.
    pub min_msi: Option<f64>,
    /// Maximum number of escaped mutants.
    pub max_escaped: Option<usize>,
}

/// Quality gate verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    /// Every configured threshold was met.
    Passed,
    /// One or more thresholds were missed.
    Failed(Vec<String>),
}

impl GateStatus {
    /// True when passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, GateStatus::Passed)
    }
}

impl QualityGate {
    /// True when no threshold is configured.
    pub fn is_disabled(&self) -> bool {
        self.min_msi.is_none() && self.max_escaped.is_none()
    }

    /// Check `report` against the configured thresholds.
    pub fn evaluate(&self, report: &RunReport) -> GateStatus {
        let mut reasons = Vec::new();
        if let Some(min_msi) = self.min_msi {
            let msi = report.mutation_score_indicator();
            if msi < min_msi {
                reasons.push(format!(
                    "mutation score indicator {msi:.2}% is below the minimum {min_msi:.2}%"
                ));
            }
        }
        if let Some(max_escaped) = self.max_escaped {
            let escaped = report.counts.escaped;
            if escaped > max_escaped {
                reasons.push(format!(
                    "{escaped} escaped mutants exceed the maximum of {max_escaped}"
                ));
            }
        }
        if reasons.is_empty() {
            GateStatus::Passed
        } else {
            GateStatus::Failed(reasons)
        }
    }
}

/// Per-mutant report entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct MutantEntry<'a> {
    id: &'a str,
    label: &'a str,
    source_file: Option<&'a str>,
    source_line: Option<u32>,
    verdict: Verdict,
    exit_code: Option<i32>,
    timed_out: bool,
    duration_ms: u64,
    stdout_preview: Option<String>,
    stderr_preview: Option<String>,
}

impl<'a> From<&'a Mutant> for MutantEntry<'a> {
    fn from(mutant: &'a Mutant) -> Self {
        let mutation = mutant.mutation();
        let outcome = mutant.outcome();
        let preview = |text: &str| (!text.is_empty()).then(|| truncate_preview(text));
        Self {
            id: &mutation.id,
            label: &mutation.label,
            source_file: mutation.location.as_ref().map(|l| l.file.as_str()),
            source_line: mutation.location.as_ref().map(|l| l.line),
            verdict: mutant.verdict(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            duration_ms: outcome.duration.as_millis() as u64,
            stdout_preview: preview(&outcome.stdout),
            stderr_preview: preview(&outcome.stderr),
        }
    }
}

/// Render a completed run in the requested format.
pub fn render_report(report: &RunReport, format: ReportFormat) -> String {
    let entries: Vec<MutantEntry<'_>> = report.mutants.iter().map(MutantEntry::from).collect();
    match format {
        ReportFormat::Json => render_json_report(report, &entries),
        ReportFormat::Markdown => render_markdown_report(report, &entries),
        ReportFormat::Sarif => render_sarif_report(report, &entries),
        ReportFormat::Junit => render_junit_report(report, &entries),
    }
}

fn render_json_report(report: &RunReport, entries: &[MutantEntry<'_>]) -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "baseline": {
            "exit_code": report.baseline.exit_code,
            "duration_ms": report.baseline.duration.as_millis() as u64,
        },
        "summary": {
            "total": report.total(),
            "killed": report.counts.killed,
            "escaped": report.counts.escaped,
            "timeout": report.counts.timeout,
            "error": report.counts.error,
            "mutation_score_indicator": report.mutation_score_indicator(),
            "kill_ratio": report.kill_ratio(),
        },
        "delivery_failures": report.delivery_failures,
        "mutants": entries,
    }))
    .unwrap_or_default()
}

fn render_markdown_report(report: &RunReport, entries: &[MutantEntry<'_>]) -> String {
    let mut out = String::from("# Mutation Run\n\n");
    out.push_str(&format!(
        "- baseline: passed in {}ms\n\n",
        report.baseline.duration.as_millis()
    ));

    out.push_str("## Summary\n\n| metric | count |\n|---|---:|\n");
    out.push_str(&format!("| total | {} |\n", report.total()));
    for verdict in Verdict::ALL {
        out.push_str(&format!("| {} | {} |\n", verdict, report.counts.get(verdict)));
    }
    out.push_str(&format!(
        "| mutation score indicator | {:.2}% |\n",
        report.mutation_score_indicator()
    ));
    out.push_str(&format!("| kill ratio | {:.2}% |\n", report.kill_ratio()));

    if !report.delivery_failures.is_empty() {
        out.push_str("\n## Event delivery failures\n\n");
        for failure in &report.delivery_failures {
            out.push_str(&format!("- {}: {}\n", failure.mutation_id, failure.message));
        }
    }

    if !entries.is_empty() {
        out.push_str("\n## Mutants\n\n");
        for m in entries {
            out.push_str(&format!("### {}\n\n", m.id));
            if !m.label.is_empty() {
                out.push_str(&format!("- **label**: {}\n", m.label));
            }
            if let (Some(file), Some(line)) = (m.source_file, m.source_line) {
                out.push_str(&format!("- **location**: {file}:{line}\n"));
            }
            out.push_str(&format!("- **verdict**: {}\n", m.verdict));
            match m.exit_code {
                Some(code) => out.push_str(&format!("- **exit code**: {code}\n")),
                None if m.timed_out => out.push_str("- **exit code**: none (timed out)\n"),
                None => out.push_str("- **exit code**: none\n"),
            }
            out.push_str(&format!("- **duration**: {}ms\n", m.duration_ms));
            if m.verdict == Verdict::Error {
                if let Some(stderr) = &m.stderr_preview {
                    out.push_str(&format!("\n```text\n{stderr}\n```\n"));
                }
            }
            out.push('\n');
        }
    }

    out
}

fn render_sarif_report(report: &RunReport, entries: &[MutantEntry<'_>]) -> String {
    let results: Vec<serde_json::Value> = entries
        .iter()
        .filter(|m| m.verdict == Verdict::Escaped)
        .map(|m| {
            let file = m.source_file.unwrap_or_default();
            let line = m.source_line.unwrap_or(1);
            serde_json::json!({
                "ruleId": "escaped-mutant",
                "level": "warning",
                "message": {
                    "text": format!("Mutant escaped: {} ({})", m.label, m.id)
                },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": {
                            "uri": file
                        },
                        "region": {
                            "startLine": line
                        }
                    }
                }]
            })
        })
        .collect();

    serde_json::to_string_pretty(&serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": [{
                        "id": "escaped-mutant",
                        "shortDescription": {
                            "text": "Escaped Mutant"
                        },
                        "fullDescription": {
                            "text": "A mutation the test suite did not detect."
                        },
                        "defaultConfiguration": {
                            "level": "warning"
                        }
                    }]
                }
            },
            "results": results,
            "properties": {
                "mutationScoreIndicator": report.mutation_score_indicator(),
                "killRatio": report.kill_ratio(),
                "totalMutants": report.total(),
                "killed": report.counts.killed,
                "escaped": report.counts.escaped
            }
        }]
    }))
    .unwrap_or_default()
}

fn render_junit_report(report: &RunReport, entries: &[MutantEntry<'_>]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<testsuites>\n");
    out.push_str(&format!(
        "  <testsuite name=\"mutation\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\">\n",
        report.total(),
        report.counts.escaped,
        report.counts.error,
        report.counts.timeout
    ));

    for m in entries {
        let classname = m
            .source_file
            .map(|file| xml_escape(&file.replace('/', ".")))
            .unwrap_or_else(|| "mutation".to_string());
        let name = xml_escape(m.id);

        match m.verdict {
            Verdict::Killed => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\"/>\n"
                ));
            }
            Verdict::Escaped => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\">\n"
                ));
                out.push_str(&format!(
                    "      <failure message=\"Mutant escaped\">{}</failure>\n",
                    xml_escape(m.label)
                ));
                out.push_str("    </testcase>\n");
            }
            Verdict::Timeout => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\">\n"
                ));
                out.push_str("      <skipped message=\"Timeout\"/>\n");
                out.push_str("    </testcase>\n");
            }
            Verdict::Error => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\">\n"
                ));
                out.push_str(&format!(
                    "      <error message=\"exit code {}\">{}</error>\n",
                    m.exit_code
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    xml_escape(m.stderr_preview.as_deref().unwrap_or_default())
                ));
                out.push_str("    </testcase>\n");
            }
        }
    }

    out.push_str("  </testsuite>\n");
    out.push_str("</testsuites>\n");
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
