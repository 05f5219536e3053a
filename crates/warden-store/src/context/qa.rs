//! QA log parsing and baseline drift detection.
//!
//! Log parsing is heuristic by design: it recognizes the common shapes of
//! lint, typecheck, test, and coverage output and degrades to an empty
//! summary on anything else. Parse failures never become errors.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::models::{QACommandSummary, QACoverageSummary, QAResults};

/// Coverage drops larger than this (percentage points) count as drift.
pub const COVERAGE_DRIFT_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QACommandKind {
    Lint,
    Typecheck,
    Test,
    Coverage,
    Unknown,
}

impl QACommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QACommandKind::Lint => "lint",
            QACommandKind::Typecheck => "typecheck",
            QACommandKind::Test => "test",
            QACommandKind::Coverage => "coverage",
            QACommandKind::Unknown => "unknown",
        }
    }
}

/// Infer the command kind from the command string. Coverage is checked
/// before test so `jest --coverage` parses coverage tables.
pub fn infer_command_kind(command: &str) -> QACommandKind {
    let lower = command.to_lowercase();
    const LINT: [&str; 5] = ["lint", "eslint", "ruff", "flake8", "clippy"];
    const TYPECHECK: [&str; 4] = ["typecheck", "tsc", "pyright", "mypy"];
    const COVERAGE: [&str; 2] = ["coverage", "cov"];
    const TEST: [&str; 4] = ["test", "jest", "pytest", "vitest"];

    if LINT.iter().any(|p| lower.contains(p)) {
        QACommandKind::Lint
    } else if TYPECHECK.iter().any(|p| lower.contains(p)) {
        QACommandKind::Typecheck
    } else if COVERAGE.iter().any(|p| lower.contains(p)) {
        QACommandKind::Coverage
    } else if TEST.iter().any(|p| lower.contains(p)) {
        QACommandKind::Test
    } else {
        QACommandKind::Unknown
    }
}

fn regex(cache: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cache.get_or_init(|| Regex::new(pattern).expect("qa pattern must compile"))
}

/// Parse a QA log into a structured summary. Unknown kinds and
/// unrecognized content yield an empty summary.
pub fn parse_qa_log(content: &str, kind: QACommandKind) -> QACommandSummary {
    match kind {
        QACommandKind::Lint => parse_lint(content),
        QACommandKind::Typecheck => parse_typecheck(content),
        QACommandKind::Test => parse_test(content),
        QACommandKind::Coverage => parse_coverage(content),
        QACommandKind::Unknown => QACommandSummary::default(),
    }
}

fn parse_lint(content: &str) -> QACommandSummary {
    static ESLINT: OnceLock<Regex> = OnceLock::new();
    static RUFF: OnceLock<Regex> = OnceLock::new();

    let mut errors = 0u64;
    let mut warnings = 0u64;

    if let Some(caps) = regex(&ESLINT, r"(\d+)\s+errors?,\s+(\d+)\s+warnings?").captures(content) {
        errors = caps[1].parse().unwrap_or(0);
        warnings = caps[2].parse().unwrap_or(0);
    }
    if let Some(caps) = regex(&RUFF, r"Found\s+(\d+)\s+errors?").captures(content) {
        errors = caps[1].parse().unwrap_or(errors);
    }

    QACommandSummary {
        lint_errors: (errors > 0).then_some(errors),
        lint_warnings: (warnings > 0).then_some(warnings),
        ..Default::default()
    }
}

fn parse_typecheck(content: &str) -> QACommandSummary {
    static TSC: OnceLock<Regex> = OnceLock::new();
    static PYRIGHT: OnceLock<Regex> = OnceLock::new();

    let mut errors = regex(&TSC, r"error\s+TS\d+:").find_iter(content).count() as u64;
    if let Some(caps) = regex(&PYRIGHT, r"(\d+)\s+errors?,\s+(\d+)\s+warnings?").captures(content) {
        errors += caps[1].parse::<u64>().unwrap_or(0);
    }

    QACommandSummary {
        type_errors: (errors > 0).then_some(errors),
        ..Default::default()
    }
}

fn parse_test(content: &str) -> QACommandSummary {
    static JEST_PASSED: OnceLock<Regex> = OnceLock::new();
    static FAILED: OnceLock<Regex> = OnceLock::new();
    static PYTEST: OnceLock<Regex> = OnceLock::new();

    let mut passed = 0u64;
    let mut failed = 0u64;

    let jest = regex(&JEST_PASSED, r"Tests:\s+(\d+)\s+passed").captures(content);
    if let Some(caps) = &jest {
        passed = caps[1].parse().unwrap_or(0);
    }
    if let Some(caps) = regex(&FAILED, r"(\d+)\s+failed").captures(content) {
        failed = caps[1].parse().unwrap_or(0);
    }
    if jest.is_none() {
        if let Some(caps) =
            regex(&PYTEST, r"(\d+)\s+passed(?:,\s+(\d+)\s+failed)?").captures(content)
        {
            passed = caps[1].parse().unwrap_or(0);
            if let Some(f) = caps.get(2) {
                failed = f.as_str().parse().unwrap_or(0);
            }
        }
    }

    QACommandSummary {
        tests_passed: (passed > 0).then_some(passed),
        tests_failed: (failed > 0).then_some(failed),
        ..Default::default()
    }
}

fn parse_coverage(content: &str) -> QACommandSummary {
    static METRIC: OnceLock<Regex> = OnceLock::new();
    static TOTAL: OnceLock<Regex> = OnceLock::new();

    let metric_re = regex(&METRIC, r"(?i)(lines|branches|functions|statements)\s*:\s*([\d.]+)%");
    let mut coverage = QACoverageSummary::default();
    let mut any = false;

    for caps in metric_re.captures_iter(content) {
        let value: f64 = match caps[2].parse() {
            Ok(value) => value,
            Err(_) => continue,
        };
        any = true;
        match caps[1].to_lowercase().as_str() {
            "lines" => coverage.lines = Some(value),
            "branches" => coverage.branches = Some(value),
            "functions" => coverage.functions = Some(value),
            "statements" => coverage.statements = Some(value),
            _ => {}
        }
    }

    // pytest-cov style: "TOTAL    400    342    85%"
    if coverage.lines.is_none() {
        if let Some(caps) = regex(&TOTAL, r"TOTAL\s+\d+\s+\d+\s+([\d.]+)%").captures(content) {
            if let Ok(value) = caps[1].parse() {
                coverage.lines = Some(value);
                any = true;
            }
        }
    }

    if any {
        QACommandSummary {
            coverage: Some(coverage),
            ..Default::default()
        }
    } else {
        QACommandSummary::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QADriftFinding {
    pub command_id: String,
    pub kind: String,
    pub baseline: serde_json::Value,
    pub current: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QADriftReport {
    pub has_drift: bool,
    pub regressions: Vec<QADriftFinding>,
    pub improvements: Vec<QADriftFinding>,
}

/// Compare two QA result sets per command id. Regressions: exit code
/// 0 → non-zero, lint/type/test-failure counts increasing, line or branch
/// coverage dropping by more than [`COVERAGE_DRIFT_THRESHOLD`]. The dual
/// conditions produce improvements.
pub fn detect_qa_drift(baseline: &QAResults, current: &QAResults) -> QADriftReport {
    let mut report = QADriftReport::default();

    for current_result in &current.results {
        let Some(baseline_result) = baseline
            .results
            .iter()
            .find(|r| r.command_id == current_result.command_id)
        else {
            continue;
        };
        let cmd_id = &current_result.command_id;

        if baseline_result.exit_code == 0 && current_result.exit_code != 0 {
            report.regressions.push(finding(
                cmd_id,
                "exit_code_regression",
                0,
                current_result.exit_code,
            ));
        } else if baseline_result.exit_code != 0 && current_result.exit_code == 0 {
            report.improvements.push(finding(
                cmd_id,
                "exit_code_improvement",
                baseline_result.exit_code,
                0,
            ));
        }

        let (Some(base), Some(cur)) = (&baseline_result.summary, &current_result.summary) else {
            continue;
        };

        compare_counts(
            &mut report,
            cmd_id,
            "lint_errors",
            base.lint_errors,
            cur.lint_errors,
        );
        compare_counts(
            &mut report,
            cmd_id,
            "type_errors",
            base.type_errors,
            cur.type_errors,
        );
        compare_counts(
            &mut report,
            cmd_id,
            "test_failures",
            base.tests_failed,
            cur.tests_failed,
        );

        if let (Some(base_cov), Some(cur_cov)) = (&base.coverage, &cur.coverage) {
            for (metric, base_val, cur_val) in [
                ("lines", base_cov.lines, cur_cov.lines),
                ("branches", base_cov.branches, cur_cov.branches),
            ] {
                let (Some(base_val), Some(cur_val)) = (base_val, cur_val) else {
                    continue;
                };
                if cur_val < base_val - COVERAGE_DRIFT_THRESHOLD {
                    report.regressions.push(finding(
                        cmd_id,
                        &format!("coverage_{metric}_dropped"),
                        base_val,
                        cur_val,
                    ));
                } else if cur_val > base_val + COVERAGE_DRIFT_THRESHOLD {
                    report.improvements.push(finding(
                        cmd_id,
                        &format!("coverage_{metric}_improved"),
                        base_val,
                        cur_val,
                    ));
                }
            }
        }
    }

    report.has_drift = !report.regressions.is_empty();
    report
}

fn compare_counts(
    report: &mut QADriftReport,
    cmd_id: &str,
    label: &str,
    baseline: Option<u64>,
    current: Option<u64>,
) {
    let (Some(baseline), Some(current)) = (baseline, current) else {
        return;
    };
    if baseline < current {
        report
            .regressions
            .push(finding(cmd_id, &format!("{label}_increased"), baseline, current));
    } else if baseline > current {
        report
            .improvements
            .push(finding(cmd_id, &format!("{label}_decreased"), baseline, current));
    }
}

fn finding<B: Into<serde_json::Value>, C: Into<serde_json::Value>>(
    command_id: &str,
    kind: &str,
    baseline: B,
    current: C,
) -> QADriftFinding {
    QADriftFinding {
        command_id: command_id.to_string(),
        kind: kind.to_string(),
        baseline: baseline.into(),
        current: current.into(),
    }
}
