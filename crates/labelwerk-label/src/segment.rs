// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Label segmentation and preprocessing.
//
// A ZPL file may hold any number of labels, each bracketed by `^XA` ... `^XZ`.
// Anything before the first `^XA` (downloaded graphics, fonts, printer setup)
// is shared by every label in the file and is prepended to each unit.
//
// All patterns run on the `regex` crate, whose matcher is linear in the input
// length, so hostile files cannot cause catastrophic backtracking.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use labelwerk_core::types::LabelUnit;

/// Line separator used to join the preamble to each unit.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// `^XA` ... `^XZ`, shortest match, across lines.
static RE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\^XA.*?\^XZ").expect("label pattern is valid"));

/// `^FN<n>` with an optional quoted prompt, directly ahead of `^FD`.
static RE_FIELD_NUMBER_BEFORE_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\^FN\d+(?:"[^"]*")?\s*(\^FD)"#).expect("field number pattern is valid")
});

static RE_NAMED_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\^FX[ \t]*FileName:[ \t]*([^\^\r\n]+)").expect("file name pattern is valid")
});

static RE_FORCED_NAMED_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\^FX[ \t]*!FileName:[ \t]*([^\^\r\n]+)")
        .expect("forced file name pattern is valid")
});

/// Characters that cannot appear in a file name on any supported platform.
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Split raw file content into label units.
///
/// Returns an empty vector when no `^XA`/`^XZ` pair is present.
pub fn split(content: &str) -> Vec<LabelUnit> {
    let Some(first) = RE_LABEL.find(content) else {
        return Vec::new();
    };

    let preamble = content[..first.start()].trim();

    let units: Vec<LabelUnit> = RE_LABEL
        .find_iter(content)
        .map(|m| {
            if preamble.is_empty() {
                LabelUnit::new(m.as_str())
            } else {
                LabelUnit::new(format!("{preamble}{LINE_SEPARATOR}{}", m.as_str()))
            }
        })
        .collect();

    debug!(units = units.len(), preamble_len = preamble.len(), "split label content");
    units
}

/// Remove `^FN` field-number tags that directly precede `^FD`.
///
/// A `^FN` not followed by `^FD` (ignoring whitespace) is left alone.
pub fn preprocess(content: &str) -> String {
    RE_FIELD_NUMBER_BEFORE_DATA
        .replace_all(content, "${1}")
        .into_owned()
}

/// Output base name from a `^FX FileName: <name>` comment, sanitized.
pub fn extract_named_output(content: &str) -> Option<String> {
    capture_name(&RE_NAMED_OUTPUT, content)
}

/// Output base name from a `^FX !FileName: <name>` comment, sanitized.
///
/// A forced name overrides any name supplied by the caller.
pub fn extract_forced_named_output(content: &str) -> Option<String> {
    capture_name(&RE_FORCED_NAMED_OUTPUT, content)
}

/// Pick the output base name for a file.
///
/// Precedence: forced embedded name, caller-supplied name, embedded name,
/// then `fallback_stem` (normally the source file stem).
pub fn resolve_output_name(caller: Option<&str>, content: &str, fallback_stem: &str) -> String {
    extract_forced_named_output(content)
        .or_else(|| caller.and_then(sanitize_file_name))
        .or_else(|| extract_named_output(content))
        .or_else(|| sanitize_file_name(fallback_stem))
        .unwrap_or_else(|| "label".to_string())
}

fn capture_name(re: &Regex, content: &str) -> Option<String> {
    re.captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| sanitize_file_name(m.as_str()))
}

/// Strip characters illegal in file names. `None` if nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !INVALID_FILE_NAME_CHARS.contains(c))
        .collect();

    let mut name = cleaned.trim();
    let stem_end = name.len().saturating_sub(4);
    if stem_end > 0 && name.get(stem_end..).is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf")) {
        name = &name[..stem_end];
    }
    let name = name.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
