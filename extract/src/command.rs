//! Command recovery from step records and console logs.
//!
//! A step record from the Jenkins API may carry its command in a structural
//! field, or only in the console log of the run that executed it. Both paths
//! live here so every extractor recovers commands the same way.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Appended to a log that was cut at the length limit.
pub const TRUNCATION_MARKER: &str = "... (日志已截断)";

static PATTERNS: LazyLock<LogPatterns> = LazyLock::new(LogPatterns::new);

struct LogPatterns {
    // Log cleaning
    html_document: Regex,
    timestamp_prefix: Regex,
    html_tag: Regex,
    blank_run: Regex,

    // Command recovery, tried in order
    quoted_sh: Regex,
    quoted_echo: Regex,
    mvn_line: Regex,
    prompt_line: Regex,
}

impl LogPatterns {
    fn new() -> Self {
        Self {
            html_document: Regex::new(r"(?s)<!DOCTYPE.*?</html>").expect("static regex must compile"),
            timestamp_prefix: Regex::new(r#"<span class="timestamp"><b>.*?</b> </span>"#)
                .expect("static regex must compile"),
            html_tag: Regex::new(r"<[^>]*>").expect("static regex must compile"),
            blank_run: Regex::new(r"\n\s*\n").expect("static regex must compile"),
            quoted_sh: Regex::new(r#"sh\s+['"](.*?)['"]"#).expect("static regex must compile"),
            quoted_echo: Regex::new(r#"echo\s+['"](.*?)['"]"#).expect("static regex must compile"),
            mvn_line: Regex::new(r"mvn\s+(.*?)[\r\n]").expect("static regex must compile"),
            prompt_line: Regex::new(r"(\$\s+.*?)[\r\n]").expect("static regex must compile"),
        }
    }
}

/// Strips HTML from a console log, collapses blank-line runs and truncates
/// to `limit` characters.
///
/// Logs rendered with timestamp spans keep only the text after each span.
///
/// ```
/// use codearts_migrate_extract::clean_log;
///
/// let raw = "<pre>+ mvn -B package\n\n\n[INFO] BUILD SUCCESS</pre>";
/// assert_eq!(clean_log(raw, 1000), "+ mvn -B package\n[INFO] BUILD SUCCESS");
/// ```
pub fn clean_log(raw: &str, limit: usize) -> String {
    let patterns = &*PATTERNS;
    let without_document = patterns.html_document.replace_all(raw, "");

    let mut pieces = patterns.timestamp_prefix.split(&without_document);
    let first = pieces.next().unwrap_or_default();
    let stamped: Vec<&str> = pieces.map(str::trim).collect();
    let text = if stamped.is_empty() {
        first.to_string()
    } else {
        stamped.join("\n")
    };

    let text = patterns.html_tag.replace_all(&text, "");
    let text = patterns.blank_run.replace_all(&text, "\n");

    let cut = text.char_indices().nth(limit).map(|(index, _)| index);
    let cleaned = match cut {
        Some(cut) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.into_owned(),
    };
    cleaned.trim().to_string()
}

/// Recovers a command from a console log.
///
/// Tries, in order: a quoted `sh` invocation, a quoted `echo` (rendered as
/// `echo '..'`), an `mvn ...` line, a `$ command` prompt line, and finally
/// the first non-empty line.
///
/// ```
/// use codearts_migrate_extract::command_from_log;
///
/// assert_eq!(command_from_log("[Pipeline] sh 'make all'\n+ make all"), "make all");
/// assert_eq!(command_from_log("$ ./gradlew test\nBUILD OK\n"), "./gradlew test");
/// ```
pub fn command_from_log(log: &str) -> String {
    let patterns = &*PATTERNS;
    if let Some(found) = patterns.quoted_sh.captures(log) {
        return found[1].to_string();
    }
    if let Some(found) = patterns.quoted_echo.captures(log) {
        return format!("echo '{}'", &found[1]);
    }
    if let Some(found) = patterns.mvn_line.captures(log) {
        return format!("mvn {}", &found[1]);
    }
    if let Some(found) = patterns.prompt_line.captures(log) {
        return found[1]
            .trim_start_matches(['$', ' '])
            .trim_end()
            .to_string();
    }
    log.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Recovers a command from the structural fields of a step record.
///
/// Field precedence: `command`, `commands` (joined by newlines), `script`,
/// `targets`, Maven `properties` (rendered as `mvn -Dk=v ...`), then any
/// other string field whose key mentions command, script or target.
pub fn command_from_fields(fields: &Map<String, Value>) -> Option<String> {
    for key in ["command", "commands", "script", "targets"] {
        match fields.get(key) {
            Some(Value::String(value)) => return Some(value.clone()),
            Some(Value::Array(items)) => {
                let lines: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                return Some(lines.join("\n"));
            }
            _ => {}
        }
    }

    if let Some(Value::Array(properties)) = fields.get("properties") {
        let mut flags = Vec::new();
        for property in properties.iter().filter_map(Value::as_object) {
            if let Some(command) = property.get("command").and_then(Value::as_str) {
                return Some(command.to_string());
            }
            for (key, value) in property {
                flags.push(format!("-D{key}={}", plain(value)));
            }
        }
        return Some(format!("mvn {}", flags.join(" ")).trim_end().to_string());
    }

    fields.iter().find_map(|(key, value)| {
        let key = key.to_lowercase();
        let mentions_command =
            key.contains("command") || key.contains("script") || key.contains("target");
        match value {
            Value::String(value) if mentions_command && key != "_class" => Some(value.clone()),
            _ => None,
        }
    })
}

/// Renders a scalar JSON value without quotes.
pub(crate) fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
