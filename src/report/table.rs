use std::fmt::Write;

use lstn_core::{Package, Problem, Severity, Verdict};
use serde_json::Value;

use super::style;

const SUCCESS_ICON: &str = "✓";
const WARNING_ICON: &str = "!";
const FAILURE_ICON: &str = "X";

const HIDDEN_METADATA: [&str; 4] = [
    "npm_package_name",
    "npm_package_version",
    "file_content",
    "lines",
];

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "31",
        Severity::Medium => "33",
        Severity::Low => "36",
    }
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

/// Summary rows sorted by (name, version), then one expansion per package with findings.
pub fn render_table(packages: &[&Package], use_color: bool) -> String {
    let mut out = String::new();

    let name_width = packages
        .iter()
        .map(|package| package.name.chars().count())
        .max()
        .unwrap_or(0);
    let version_width = packages
        .iter()
        .map(|package| package.version.as_deref().unwrap_or_default().chars().count())
        .max()
        .unwrap_or(0);

    for package in packages {
        let (verdicts_icon, verdicts_color) = if package.verdicts.is_empty() {
            (SUCCESS_ICON, "32")
        } else {
            (FAILURE_ICON, "31")
        };
        let (problems_icon, problems_color) = if package.problems.is_empty() {
            (SUCCESS_ICON, "32")
        } else {
            (WARNING_ICON, "33")
        };

        let name = format!("{:<name_width$}", package.name);
        let version = format!(
            "{:<version_width$}",
            package.version.as_deref().unwrap_or_default()
        );
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            style(&name, "1", use_color),
            version,
            style(
                &format!("{verdicts_icon} {} verdicts", package.verdicts.len()),
                verdicts_color,
                use_color
            ),
            style(
                &format!("{problems_icon} {} problems", package.problems.len()),
                problems_color,
                use_color
            ),
        );
    }

    for package in packages.iter().filter(|package| !package.is_clean()) {
        out.push('\n');
        render_package(&mut out, package, use_color);
    }

    out
}

fn render_package(out: &mut String, package: &Package, use_color: bool) {
    let verdicts = package.verdicts.len();
    let problems = package.problems.len();
    let version = package
        .version
        .as_deref()
        .map(|version| format!("@{}", style(version, "1;36", use_color)))
        .unwrap_or_default();

    let _ = writeln!(
        out,
        "There {} {} {} and {} {} for {}{}\n",
        plural(verdicts, "is", "are"),
        style(&verdicts.to_string(), "1", use_color),
        plural(verdicts, "verdict", "verdicts"),
        style(&problems.to_string(), "1", use_color),
        plural(problems, "problem", "problems"),
        style(&package.name, "1;36", use_color),
        version,
    );

    for verdict in &package.verdicts {
        render_verdict(out, package, verdict, use_color);
    }
    for problem in &package.problems {
        render_problem(out, problem, use_color);
    }
    out.push('\n');
}

fn render_verdict(out: &mut String, package: &Package, verdict: &Verdict, use_color: bool) {
    let _ = write!(
        out,
        "  {} {}",
        style(
            &format!("[{}]", verdict.severity),
            severity_color(verdict.severity),
            use_color
        ),
        verdict.message
    );
    if let Some((name, version)) = verdict.transitive_origin(&package.name, package.version.as_deref())
    {
        let _ = write!(
            out,
            " (from transitive dependency {}@{})",
            style(name, "1;36", use_color),
            style(version, "1;36", use_color)
        );
    }
    out.push('\n');

    for (key, value) in &verdict.metadata {
        if HIDDEN_METADATA.contains(&key.as_str()) {
            continue;
        }
        let rendered = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => continue,
        };
        if rendered.is_empty() {
            continue;
        }
        let _ = writeln!(out, "    {key}: {}", style(&rendered, "90", use_color));
    }
}

fn render_problem(out: &mut String, problem: &Problem, use_color: bool) {
    let _ = writeln!(
        out,
        "  {}: {}",
        style(&format!("- {}", problem.title), "33", use_color),
        style(&problem.kind, "90", use_color)
    );
}
