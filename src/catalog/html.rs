use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(/?[a-zA-Z]+)(?:[^>]+)?>").unwrap());
static ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(gt|lt|quot|amp);").unwrap());

/// Reduces an HTML description to plain text and wraps it in an HTML
/// comment, the form the host renders as a collapsed description.
pub fn trim_html(html: &str) -> String {
    let text = html.replace('\u{a0}', "");

    let text = TAG.replace_all(&text, |caps: &Captures| {
        match &caps[1] {
            "/p" => "\n\n",
            "br" => "\n",
            "li" => "* ",
            "code" | "/code" => "`",
            _ => "",
        }
        .to_string()
    });

    let text = ENTITY.replace_all(&text, |caps: &Captures| {
        match &caps[1] {
            "gt" => ">",
            "lt" => "<",
            "quot" => "\"",
            "amp" => "&",
            _ => "",
        }
        .to_string()
    });

    // A literal --> would close the wrapping comment early
    let text = text.replace("-->", "→");

    format!("<!--\n{}\n-->", text.trim())
}
