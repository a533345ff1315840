//! Text sanitization shared by the message composer and the rename flow.
//!
//! Markup is removed rather than escaped: tags disappear, the contents of
//! `<script>` and `<style>` elements disappear with them, and HTML comments
//! are dropped. Plain text between tags is kept.

/// Elements whose text content is never displayed.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Strips markup until the text no longer changes.
///
/// A single pass can expose a new tag once an inner one is removed
/// (`<<b>script>`), so passes repeat until a fixed point. Each pass only
/// ever removes characters, so this terminates.
pub fn strip_markup(input: &str) -> String {
    let mut current = strip_markup_once(input);
    loop {
        let next = strip_markup_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_markup_once(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        match after.chars().next() {
            Some(c) if c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?') => {}
            _ => {
                // A lone '<' ("a < b") is text, not a tag.
                out.push('<');
                rest = after;
                continue;
            }
        }

        if let Some(comment) = after.strip_prefix("!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        // Unterminated tag: everything after it is inside the tag.
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };

        let name = after[..close]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        rest = &after[close + 1..];

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            rest = skip_raw_text(rest, &name);
        }
    }

    out.push_str(rest);
    out
}

/// Skips past the closing tag of a raw-text element, or to the end of input
/// when it is never closed.
fn skip_raw_text<'a>(rest: &'a str, name: &str) -> &'a str {
    let closing = format!("</{}", name);
    // ASCII lowercasing keeps byte offsets intact.
    let Some(start) = rest.to_ascii_lowercase().find(&closing) else {
        return "";
    };
    let tail = &rest[start..];
    match tail.find('>') {
        Some(end) => &tail[end + 1..],
        None => "",
    }
}

/// Sanitizes a username candidate: markup removed, lower-cased, and reduced
/// to `[a-z0-9_]`.
///
/// Idempotent: the output contains no `<`, no upper-case letters and no
/// characters outside the allowed set, so a second pass changes nothing.
pub fn sanitize_username(raw: &str) -> String {
    strip_markup(raw)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Sanitizes chat message text and caps it at `max_chars` characters.
pub fn sanitize_message(raw: &str, max_chars: usize) -> String {
    let stripped = strip_markup(raw);
    match stripped.char_indices().nth(max_chars) {
        Some((cut, _)) => stripped[..cut].to_string(),
        None => stripped,
    }
}
