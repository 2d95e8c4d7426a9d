//! Plain-text to storage-format markup helpers.
//!
//! The wiki stores page bodies as XHTML-like storage format. Free-form text
//! supplied by callers (change summaries, custom page content) is converted
//! here before it is injected into a template.

/// Escape the five XML special characters for storage-format bodies.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert free-form text to simple storage-format markup.
///
/// Consecutive lines starting with `- ` or `* ` become a `<ul>` list;
/// everything else becomes one `<p>` per line. Blank lines separate blocks.
pub fn text_to_html(text: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut list_items: Vec<String> = Vec::new();

    let flush_list = |items: &mut Vec<String>, blocks: &mut Vec<String>| {
        if !items.is_empty() {
            blocks.push(format!("<ul>{}</ul>", items.join("")));
            items.clear();
        }
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_list(&mut list_items, &mut blocks);
            continue;
        }
        if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            list_items.push(format!("<li>{}</li>", escape_html(item.trim())));
        } else {
            flush_list(&mut list_items, &mut blocks);
            blocks.push(format!("<p>{}</p>", escape_html(trimmed)));
        }
    }
    flush_list(&mut list_items, &mut blocks);

    blocks.join("\n")
}
