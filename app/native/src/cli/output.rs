//! Terminal output shared by the commands.
//!
//! `--json` output goes through [`print_json`], which pretty-prints with
//! colored keys and scalars. Listings go through [`print_table`].

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::error::BackdropError;

const INDENT: &str = "  ";

/// Serializes `value` and prints it as colored, indented JSON.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), BackdropError> {
    let value = serde_json::to_value(value)?;
    println!("{}", render_json(&value));
    Ok(())
}

/// Renders `value` the way `serde_json::to_string_pretty` lays it out, with
/// keys in cyan, strings in green, numbers in yellow and literals in magenta.
#[must_use]
pub fn render_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str(&"null".magenta().to_string()),
        Value::Bool(flag) => out.push_str(&flag.to_string().magenta().to_string()),
        Value::Number(number) => out.push_str(&number.to_string().yellow().to_string()),
        Value::String(text) => out.push_str(&quoted(text).green().to_string()),
        Value::Array(values) if values.is_empty() => out.push_str("[]"),
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Array(values) => {
            out.push('[');
            for (i, item) in values.iter().enumerate() {
                open_line(out, i, depth + 1);
                write_value(out, item, depth + 1);
            }
            close_line(out, depth);
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                open_line(out, i, depth + 1);
                out.push_str(&quoted(key).cyan().to_string());
                out.push_str(": ");
                write_value(out, item, depth + 1);
            }
            close_line(out, depth);
            out.push('}');
        }
    }
}

fn open_line(out: &mut String, index: usize, depth: usize) {
    if index > 0 {
        out.push(',');
    }
    out.push('\n');
    out.push_str(&INDENT.repeat(depth));
}

fn close_line(out: &mut String, depth: usize) {
    out.push('\n');
    out.push_str(&INDENT.repeat(depth));
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
}

/// Prints a bold title followed by `rows` as a rounded table.
///
/// With `center_last`, the last column is centered; used for marker columns.
pub fn print_table<R: Tabled>(title: &str, rows: Vec<R>, center_last: bool) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    if center_last {
        table.with(Modify::new(Columns::last()).with(Alignment::center()));
    }
    println!("{}", title.bold());
    println!("{table}");
}

/// Shortens `text` to at most `max_chars` characters, ending in `…` when cut.
#[must_use]
pub fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let end = text
        .char_indices()
        .nth(max_chars.saturating_sub(1))
        .map_or(text.len(), |(index, _)| index);
    format!("{}…", &text[..end])
}

/// Green dot for the active row, a dim one otherwise.
#[must_use]
pub fn active_marker(active: bool) -> String {
    if active { "●".green().to_string() } else { "·".dimmed().to_string() }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn strip_colors(text: &str) -> String {
        let mut plain = String::new();
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            if ch == '\u{1b}' {
                chars.by_ref().find(|&c| c == 'm');
            } else {
                plain.push(ch);
            }
        }
        plain
    }

    #[test]
    fn test_render_json_matches_pretty_layout() {
        let value = json!({
            "name": "bing",
            "active": true,
            "retries": 3,
            "license": null,
            "tags": ["daily", "say \"hi\""],
            "empty": {},
            "nested": { "screen": { "width": 1920 } },
        });

        let rendered = strip_colors(&render_json(&value));
        assert_eq!(rendered, serde_json::to_string_pretty(&value).unwrap());
    }

    #[test]
    fn test_render_json_scalars() {
        assert_eq!(strip_colors(&render_json(&json!("Bing"))), "\"Bing\"");
        assert_eq!(strip_colors(&render_json(&json!([]))), "[]");
    }

    #[test]
    fn test_clip_keeps_short_text() {
        assert_eq!(clip("Lake", 10), "Lake");
        assert_eq!(clip("Lake", 4), "Lake");
    }

    #[test]
    fn test_clip_counts_characters() {
        assert_eq!(clip("Lac Léman à l'aube", 9), "Lac Léma…");
        assert_eq!(clip("sunset 🌅 over the bay", 9), "sunset 🌅…");
        assert_eq!(clip("Lake", 0), "…");
    }

    #[test]
    fn test_active_marker() {
        assert!(active_marker(true).contains('●'));
        assert!(!active_marker(false).contains('●'));
    }
}
