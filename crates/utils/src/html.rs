//! Minimal HTML helpers for server-rendered fragments.

use std::fmt::Write as _;

/// Escape text for use in element content and quoted attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render `<option>` elements, marking `selected` when it matches.
pub fn options<'a, I>(values: I, selected: Option<&str>) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (value, label) in values {
        let sel = if selected == Some(value) { " selected" } else { "" };
        let _ = write!(
            out,
            r#"<option value="{}"{sel}>{}</option>"#,
            escape(value),
            escape(label)
        );
    }
    out
}

/// Convert plain text to paragraphs, preserving single line breaks.
pub fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", escape(block).replace('\n', "<br>")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn options_marks_selected() {
        let html = options([("a", "Alpha"), ("b", "Beta")], Some("b"));
        assert!(html.contains(r#"<option value="b" selected>Beta</option>"#));
        assert!(html.contains(r#"<option value="a">Alpha</option>"#));
    }

    #[test]
    fn paragraphs_split_blocks() {
        let html = paragraphs("one\ntwo\n\n\nthree <b>");
        assert_eq!(html, "<p>one<br>two</p><p>three &lt;b&gt;</p>");
    }
}
