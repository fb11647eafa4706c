//! Rich-text sanitization for the details body.
//!
//! The body comes from a shared, multi-editor source. Script-bearing
//! elements, event-handler attributes, and script-scheme URLs are stripped
//! before anything reaches the screen; for terminal display the remaining
//! markup is flattened to plain text lines, so it is never rendered as
//! markup at all.

use std::sync::OnceLock;

use regex::Regex;

/// Elements whose content must never be shown.
const DANGEROUS_ELEMENTS: &[&str] = &["script", "style", "iframe", "object", "embed"];

fn dangerous_block_res() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        DANGEROUS_ELEMENTS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                    .unwrap_or_else(|e| panic!("invalid sanitizer pattern for <{tag}>: {e}"))
            })
            .collect()
    })
}

fn dangerous_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(?:script|style|iframe|object|embed)\b[^>]*>").unwrap()
    })
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\son\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).unwrap())
}

fn script_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(href|src)\s*=\s*("\s*javascript:[^"]*"|'\s*javascript:[^']*'|javascript:[^\s>]+)"#)
            .unwrap()
    })
}

/// Strip script-bearing and event-handler-bearing content. Benign markup is
/// left intact.
pub fn sanitize_html(html: &str) -> String {
    let mut out = html.to_string();
    for re in dangerous_block_res() {
        out = re.replace_all(&out, "").into_owned();
    }
    // Unclosed or stray dangerous tags survive the block pass.
    out = dangerous_tag_re().replace_all(&out, "").into_owned();
    out = event_handler_re().replace_all(&out, "").into_owned();
    out = script_url_re().replace_all(&out, r##"$1="#""##).into_owned();
    out
}

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>|</h[1-6]\s*>|</tr\s*>").unwrap()
    })
}

fn any_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// Sanitize, then flatten markup to displayable text: block closers become
/// line breaks, remaining tags are dropped, entities are decoded, and blank
/// runs collapse.
pub fn plain_text(html: &str) -> String {
    let safe = sanitize_html(html);
    let broken = line_break_re().replace_all(&safe, "\n");
    let stripped = any_tag_re().replace_all(&broken, "");
    let decoded = decode_entities(&stripped);

    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = true; // swallow leading blanks
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !blank_run {
                lines.push("");
                blank_run = true;
            }
        } else {
            lines.push(trimmed);
            blank_run = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
