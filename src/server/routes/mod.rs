//! Resource handlers
//!
//! Every handler has the [`Handler`](super::resource::Handler) signature and
//! is bound to a location by the server or by a program.

pub mod ism;
pub mod program;
pub mod site;

/// Minimal escaping for text placed in generated HTML
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
