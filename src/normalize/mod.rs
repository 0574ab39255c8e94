
use fancy_regex::Regex;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::database::sqlite::models::Document;
use crate::{RecsyncError, Result};

/// Substituted for fenced code blocks. Code content carries no semantic
/// signal and would pollute the embedding.
const CODE_BLOCK_PLACEHOLDER: &str = " [code block] ";
/// Substituted for inline code spans.
const INLINE_CODE_PLACEHOLDER: &str = " [code] ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Hard ceiling on the cleaned body, in characters. Applies to the body
    /// only; title, summary, and tags are never truncated.
    pub body_max_chars: usize,
    /// Repeat the tags line once for emphasis. Tags are strong signals for
    /// similarity, so they get extra weight in the embedded text.
    pub repeat_tags: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            body_max_chars: 5000,
            repeat_tags: true,
        }
    }
}

/// A document reduced to one bounded plain-text string ready for embedding,
/// with display metadata carried through for the index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDocument {
    pub slug: String,
    pub text: String,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub starred: bool,
    /// Content timestamp as RFC 3339, carried into the index entry
    pub updated_at: String,
}

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http[s]?://\S+").expect("valid regex"));
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+").expect("valid regex"));
static SPECIAL_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^\w\s.,!?;:\-'"]"#).expect("valid regex"));
static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Convert a document into its embedding input text.
///
/// The output is a deterministic function of the document: code spans become
/// placeholders, markup is rendered to plain text, URLs and e-mail-like
/// tokens are stripped, punctuation outside a small whitelist collapses to
/// spaces, and the result is assembled as a fixed-order composite of title,
/// summary, tags, and the truncated body.
pub fn normalize(document: &Document, config: &NormalizeConfig) -> Result<ProcessedDocument> {
    if document.slug.trim().is_empty() {
        return Err(RecsyncError::InvalidInput(
            "document key is empty".to_string(),
        ));
    }

    let tags = document.tag_list();
    if document.title.trim().is_empty()
        && document.summary.trim().is_empty()
        && document.body.trim().is_empty()
        && tags.is_empty()
    {
        return Err(RecsyncError::InvalidInput(format!(
            "document '{}' has no content to normalize",
            document.slug
        )));
    }

    let stripped = strip_markup(&document.body);
    let clean_body = clean_text(&stripped);
    let body = truncate_chars(&clean_body, config.body_max_chars);

    let tag_line = tag_emphasis_line(&tags, config.repeat_tags);

    // Title and summary lead so they carry the most weight; the final clean
    // pass collapses the layout newlines into single spaces.
    let combined = format!(
        "Title: {}\n\nSummary: {}\n\n{}\n\nContent: {}",
        document.title, document.summary, tag_line, body
    );
    let text = clean_text(&combined);

    Ok(ProcessedDocument {
        slug: document.slug.clone(),
        text,
        title: document.title.clone(),
        summary: document.summary.clone(),
        tags,
        starred: document.starred,
        updated_at: document.updated_at.and_utc().to_rfc3339(),
    })
}

/// Render markdown to plain text, replacing code with placeholder tokens and
/// dropping raw HTML.
fn strip_markup(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut text = String::new();
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                text.push_str(CODE_BLOCK_PLACEHOLDER);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
            }
            Event::Start(Tag::Paragraph | Tag::Heading { .. } | Tag::Item | Tag::BlockQuote(_))
            | Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::BlockQuote(_),
            ) => {
                text.push(' ');
            }
            Event::Text(t) => {
                if !in_code_block {
                    text.push_str(&t);
                }
            }
            Event::Code(_) => {
                text.push_str(INLINE_CODE_PLACEHOLDER);
            }
            Event::SoftBreak | Event::HardBreak => {
                text.push(' ');
            }
            Event::Html(_) | Event::InlineHtml(_) => {}
            _ => {}
        }
    }

    text
}

/// Strip URLs and e-mail-like tokens, collapse special characters and
/// whitespace runs, and trim.
fn clean_text(text: &str) -> String {
    let text = URL_REGEX.replace_all(text, "");
    let text = EMAIL_REGEX.replace_all(&text, "");
    let text = SPECIAL_CHARS_REGEX.replace_all(&text, " ");
    let text = WHITESPACE_REGEX.replace_all(&text, " ");
    text.trim().to_string()
}

fn tag_emphasis_line(tags: &[String], repeat: bool) -> String {
    if tags.is_empty() {
        return String::new();
    }

    let joined = tags.join(" ");
    if repeat {
        format!("Topics: {joined}. Keywords: {joined}")
    } else {
        format!("Topics: {joined}")
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
