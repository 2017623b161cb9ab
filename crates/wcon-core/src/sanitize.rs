//! Markup allow-list for console output.
//!
//! Process output is attacker-influenced (anything echoed into the console,
//! player names included), so everything crossing to a render surface goes
//! through [`sanitize`]. The allow-list is a single element: `<mark>` with an
//! optional `class` attribute. Every other tag — `<script>`, event-handler
//! attributes, `javascript:` URIs, `<style>` blocks — is neutralized by
//! escaping its angle brackets; the text content is preserved.

/// Class prefix carried by tagged fragments, e.g. `consoleMark-error`.
pub const MARK_CLASS_PREFIX: &str = "consoleMark-";

/// Wrap a fragment in the newline-delimited mark annotation for `tag`.
///
/// A fragment tagged `"warn"` renders as
/// `\n<mark class="consoleMark-warn">…</mark>\n`.
pub fn mark_fragment(data: &str, tag: &str) -> String {
    format!("\n<mark class=\"{MARK_CLASS_PREFIX}{tag}\">{data}</mark>\n")
}

/// Filter `input` through the allow-list.
///
/// Allowed and re-emitted in canonical form:
/// - `<mark>` / `<mark class="...">` where the class value is restricted to
///   `[A-Za-z0-9 _-]` (any other attribute is dropped),
/// - `</mark>`.
///
/// Everything else that looks like a tag is escaped in place. Applied once
/// per outbound batch, not per fragment.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let tail = &rest[lt..];

        match tail[1..].find('>') {
            Some(rel) => {
                let gt = rel + 1;
                let inner = &tail[1..gt];
                match rewrite_tag(inner) {
                    Some(clean) => out.push_str(&clean),
                    None => {
                        out.push_str("&lt;");
                        // A '<' inside the rejected candidate must not
                        // survive either, or it could open a new tag.
                        out.push_str(&inner.replace('<', "&lt;"));
                        out.push_str("&gt;");
                    }
                }
                rest = &tail[gt + 1..];
            }
            None => {
                // Unterminated tag at end of batch.
                out.push_str("&lt;");
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Rewrite the inside of a `<...>` candidate if it is an allowed mark tag.
fn rewrite_tag(inner: &str) -> Option<String> {
    let trimmed = inner.trim();

    if let Some(name) = trimmed.strip_prefix('/') {
        return name
            .trim()
            .eq_ignore_ascii_case("mark")
            .then(|| "</mark>".to_string());
    }

    let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let name_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let (name, attrs) = body.split_at(name_len);
    if !name.eq_ignore_ascii_case("mark") {
        return None;
    }

    match class_attr(attrs).filter(|v| valid_class(v)) {
        Some(value) => Some(format!("<mark class=\"{value}\">")),
        None => Some("<mark>".to_string()),
    }
}

/// Extract the value of a `class` attribute from a tag body, if present.
fn class_attr(body: &str) -> Option<&str> {
    let bytes = body.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let name = &body[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        if i >= bytes.len() || bytes[i] != b'=' {
            // Bare attribute with no value.
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
            let quote = bytes[i];
            i += 1;
            let value_start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            if i >= bytes.len() {
                return None; // unterminated quote
            }
            let v = &body[value_start..i];
            i += 1;
            v
        } else {
            let value_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            &body[value_start..i]
        };

        if name.eq_ignore_ascii_case("class") {
            return Some(value);
        }
    }

    None
}

fn valid_class(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_fragment_exact_form() {
        assert_eq!(
            mark_fragment("disk full", "warn"),
            "\n<mark class=\"consoleMark-warn\">disk full</mark>\n"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        let input = "server started on port 30120\nready\n";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn tagged_fragment_survives_sanitization() {
        let batch = mark_fragment("oops", "error");
        assert_eq!(sanitize(&batch), batch);
    }

    #[test]
    fn script_tag_is_neutralized() {
        let out = sanitize("hi <script>alert(1)</script> there");
        assert!(!out.contains("<script"));
        assert_eq!(out, "hi &lt;script&gt;alert(1)&lt;/script&gt; there");
    }

    #[test]
    fn script_inside_marked_fragment_is_neutralized() {
        let batch = mark_fragment("<script>steal()</script>", "warn");
        let out = sanitize(&batch);
        assert!(out.contains("<mark class=\"consoleMark-warn\">"));
        assert!(out.contains("</mark>"));
        assert!(!out.contains("<script"));
    }

    #[test]
    fn event_handler_attributes_are_dropped() {
        let out = sanitize("<mark onclick=\"alert(1)\" class=\"consoleMark-info\">x</mark>");
        assert_eq!(out, "<mark class=\"consoleMark-info\">x</mark>");
    }

    #[test]
    fn mark_without_class_is_allowed() {
        assert_eq!(sanitize("<mark>notice</mark>"), "<mark>notice</mark>");
    }

    #[test]
    fn unsafe_class_value_is_dropped() {
        let out = sanitize("<mark class=\"a&quot;onmouseover=x\">y</mark>");
        assert_eq!(out, "<mark>y</mark>");
    }

    #[test]
    fn javascript_uri_cannot_survive() {
        // No href-bearing element is allowed, so the vector dies with the tag.
        let out = sanitize("<a href=\"javascript:alert(1)\">click</a>");
        assert!(!out.contains("<a"));
        assert!(out.starts_with("&lt;a href="));
    }

    #[test]
    fn style_block_is_neutralized() {
        let out = sanitize("<style>body{background:url(//evil)}</style>");
        assert!(!out.contains("<style"));
    }

    #[test]
    fn unterminated_tag_is_escaped() {
        assert_eq!(sanitize("tail <mark class=\"x"), "tail &lt;mark class=\"x");
        assert_eq!(sanitize("dangling <"), "dangling &lt;");
    }

    #[test]
    fn nested_open_bracket_cannot_reopen_a_tag() {
        let out = sanitize("<x <mark>payload");
        assert!(!out.contains('<'));
    }

    #[test]
    fn close_tag_case_and_spacing_normalized() {
        assert_eq!(sanitize("</MARK >"), "</mark>");
        assert_eq!(sanitize("<MARK CLASS='consoleMark-ok'>"), "<mark class=\"consoleMark-ok\">");
    }

    #[test]
    fn marker_lookalike_is_rejected() {
        let out = sanitize("<marker>x</marker>");
        assert_eq!(out, "&lt;marker&gt;x&lt;/marker&gt;");
    }

    #[test]
    fn stray_close_bracket_is_inert() {
        assert_eq!(sanitize("a > b"), "a > b");
    }
}
