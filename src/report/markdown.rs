//! Minimal markdown handling for report bodies: headings, bold, italics,
//! lists, and line breaks. Model output is parsed into blocks once and the
//! HTML and PDF renderers both work from those.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    ListItem(String),
    Paragraph(String),
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern"))
}

fn italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*([^*]+)\*").expect("italic pattern"))
}

pub fn parse(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("### ") {
            blocks.push(Block::Heading {
                level: 3,
                text: rest.trim().to_string(),
            });
        } else if let Some(rest) = line.strip_prefix("## ") {
            blocks.push(Block::Heading {
                level: 2,
                text: rest.trim().to_string(),
            });
        } else if let Some(rest) = line.strip_prefix("# ") {
            blocks.push(Block::Heading {
                level: 1,
                text: rest.trim().to_string(),
            });
        } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            blocks.push(Block::ListItem(rest.trim().to_string()));
        } else if let Some(rest) = numbered_item(line) {
            blocks.push(Block::ListItem(rest.to_string()));
        } else {
            blocks.push(Block::Paragraph(line.to_string()));
        }
    }
    blocks
}

fn numbered_item(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once('.')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(rest.strip_prefix(' ')?.trim_start())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Inline markdown to HTML: bold before italics so `**` pairs don't get
/// eaten as two `*` pairs.
fn inline_html(text: &str) -> String {
    let escaped = escape(text);
    let bolded = bold_re().replace_all(&escaped, "<strong>$1</strong>");
    italic_re().replace_all(&bolded, "<em>$1</em>").into_owned()
}

/// Strips inline markers for plain-text rendering (the PDF layer).
pub fn inline_plain(text: &str) -> String {
    text.replace("**", "").replace('*', "")
}

/// Renders blocks to the minimal HTML subset, wrapping runs of list items
/// in a single `<ul>`.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut in_list = false;
    for block in blocks {
        if in_list && !matches!(block, Block::ListItem(_)) {
            out.push_str("</ul>\n");
            in_list = false;
        }
        match block {
            Block::Heading { level, text } => {
                out.push_str(&format!("<h{level}>{}</h{level}>\n", inline_html(text)));
            }
            Block::ListItem(text) => {
                if !in_list {
                    out.push_str("<ul>\n");
                    in_list = true;
                }
                out.push_str(&format!("<li>{}</li>\n", inline_html(text)));
            }
            Block::Paragraph(text) => {
                out.push_str(&format!("<p>{}</p>\n", inline_html(text)));
            }
        }
    }
    if in_list {
        out.push_str("</ul>\n");
    }
    out
}
