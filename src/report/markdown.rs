use std::collections::BTreeMap;
use std::fmt::Write;

use lstn_core::{Package, Response, Severity, Verdict};

const CODE_GROUPS: [(&str, &str); 6] = [
    ("FNI", "Dynamic instrumentation"),
    ("TSN", "Typosquatting"),
    ("MDN", "Metadata"),
    ("STN", "Static analysis"),
    ("DDN", "Advisories"),
    ("UNK", "Unknown"),
];

const SEVERITIES: [(Severity, &str); 3] = [
    (Severity::High, "🚨 Critical severity"),
    (Severity::Medium, "⚠️ Medium severity"),
    (Severity::Low, "🔷 Low severity"),
];

fn code_group_label(group: &str) -> &'static str {
    CODE_GROUPS
        .iter()
        .find(|(prefix, _)| *prefix == group)
        .map_or("Unknown", |(_, label)| label)
}

fn package_label(name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{name}@{version}"),
        None => name.to_string(),
    }
}

/// severity → code group → package → verdicts
type Nested<'a> = BTreeMap<&'a str, BTreeMap<String, Vec<(&'a Package, &'a Verdict)>>>;

fn nest(response: &Response, severity: Severity) -> Nested<'_> {
    let mut nested = Nested::new();
    for (package, verdict) in response.verdicts() {
        if verdict.severity != severity {
            continue;
        }
        let group = CODE_GROUPS
            .iter()
            .map(|(prefix, _)| *prefix)
            .find(|prefix| *prefix == verdict.code_group())
            .unwrap_or("UNK");
        nested
            .entry(group)
            .or_default()
            .entry(package_label(&package.name, package.version.as_deref()))
            .or_default()
            .push((package, verdict));
    }
    nested
}

/// The full report posted as a pull request comment.
pub fn render_markdown(response: &Response) -> String {
    let mut out = String::new();

    let counts = SEVERITIES.map(|(severity, _)| {
        response
            .verdicts()
            .filter(|(_, verdict)| verdict.severity == severity)
            .count()
    });
    let _ = writeln!(
        out,
        "<!-- high: {}, medium: {}, low: {} -->",
        counts[0], counts[1], counts[2]
    );
    out.push_str("## Dependency report\n\n");

    let problems = response
        .sorted()
        .into_iter()
        .filter(|package| !package.problems.is_empty())
        .collect::<Vec<_>>();

    if counts.iter().all(|count| *count == 0) && problems.is_empty() {
        let _ = writeln!(
            out,
            "✅ Nothing to report: no verdicts and no problems for the {} analyzed {}.",
            response.len(),
            if response.len() == 1 {
                "dependency"
            } else {
                "dependencies"
            }
        );
        return out;
    }

    for (severity, title) in SEVERITIES {
        let nested = nest(response, severity);
        if nested.is_empty() {
            continue;
        }
        let _ = writeln!(out, "### {title}\n");

        for (prefix, _) in CODE_GROUPS {
            let Some(packages) = nested.get(prefix) else {
                continue;
            };
            let _ = writeln!(out, "#### {}\n", code_group_label(prefix));
            for (label, verdicts) in packages {
                let _ = writeln!(out, "- **`{label}`**");
                let mut verdicts = verdicts.clone();
                verdicts.sort_by(|left, right| left.1.code.cmp(&right.1.code));
                for (package, verdict) in verdicts {
                    let code = if verdict.code.is_empty() {
                        String::new()
                    } else {
                        format!("`{}` ", verdict.code)
                    };
                    let _ = write!(out, "  - {code}{}", verdict.message);
                    if let Some((name, version)) =
                        verdict.transitive_origin(&package.name, package.version.as_deref())
                    {
                        let _ = write!(out, " _(from transitive dependency `{name}@{version}`)_");
                    }
                    out.push('\n');
                }
            }
            out.push('\n');
        }
    }

    if !problems.is_empty() {
        out.push_str("### Problems\n\n");
        for package in problems {
            let label = package_label(&package.name, package.version.as_deref());
            for problem in &package.problems {
                let _ = writeln!(
                    out,
                    "- **`{label}`**: [{}]({})",
                    problem.title, problem.kind
                );
            }
        }
        out.push('\n');
    }

    out
}
