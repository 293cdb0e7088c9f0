//! Rendering of verdict responses: terminal table, Markdown, and JSON output.

mod markdown;
mod table;

use std::io::IsTerminal;

use lstn_core::Response;

use crate::error::CliError;
use crate::jq::{JqError, Query};

pub use markdown::render_markdown;
pub use table::render_table;

/// Colours only when stdout is a terminal and `NO_COLOR` is unset.
pub fn stdout_uses_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

pub(crate) fn style(value: &str, ansi_code: &str, use_color: bool) -> String {
    if use_color {
        return format!("\x1b[{ansi_code}m{value}\x1b[0m");
    }

    value.to_string()
}

/// The `--json` output: the combined response, optionally filtered by `--jq`.
pub fn render_json(response: &Response, jq: &str) -> Result<String, CliError> {
    if jq.is_empty() {
        let mut rendered = serde_json::to_string(response)?;
        rendered.push('\n');
        return Ok(rendered);
    }

    let value = serde_json::to_value(response)?;
    let query = Query::compile(jq)?;
    let mut rendered = String::new();
    match query.render_into(&value, &mut rendered) {
        Ok(()) => Ok(rendered),
        Err(JqError::Halt { code, message }) => Err(CliError::Halt {
            code,
            value: message,
            output: rendered,
        }),
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
#[path = "../tests/report.rs"]
mod tests;
