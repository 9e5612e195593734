//! Markdown to sanitized HTML, with stable heading anchors and a table of
//! contents.

use std::collections::HashSet;
use std::sync::LazyLock;

use docnest_shared::{DocMetadata, DocSubtitle};
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};

const ANCHOR_PREFIX: &str = "section-";
const MAX_ANCHOR_SLUG_LEN: usize = 50;

static SANITIZER: LazyLock<ammonia::Builder<'static>> = LazyLock::new(|| {
    let mut builder = ammonia::Builder::default();
    builder
        .add_tags(&["input"])
        .add_tag_attributes("input", &["type", "checked", "disabled"]);
    for heading in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        builder.add_tag_attributes(heading, &["id"]);
    }
    builder
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<h([1-6])([^>]*)>(.*?)</h[1-6]>").expect("HEADING regex is valid")
});
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s*\bid="([^"]*)""#).expect("ID_ATTR regex is valid"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("TAG regex is valid"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\s\w]").expect("NON_WORD regex is valid"));
static SELF_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a class="heading-anchor"[^>]*>#</a>"#).expect("SELF_LINK regex is valid")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE regex is valid"));

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub metadata: DocMetadata,
}

/// Renders markdown and anchors every non-empty heading.
///
/// Anchors are `section-<id or slugified text>`; a repeated anchor gets
/// `-1`, `-2`, ... appended. Each heading also receives a trailing
/// `<a class="heading-anchor">` self-link.
pub fn render(markdown: &str) -> Rendered {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let mut raw = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut raw, Parser::new_ext(markdown, options));
    let clean = SANITIZER.clean(&raw).to_string();

    let mut used = HashSet::new();
    let mut subtitles = Vec::new();
    let html = HEADING
        .replace_all(&clean, |caps: &Captures| {
            anchor_heading(caps, &mut used, &mut subtitles)
        })
        .into_owned();

    Rendered {
        html,
        metadata: DocMetadata { subtitles },
    }
}

fn anchor_heading(
    caps: &Captures,
    used: &mut HashSet<String>,
    subtitles: &mut Vec<DocSubtitle>,
) -> String {
    let level = &caps[1];
    let attrs = &caps[2];
    let inner = &caps[3];

    let title = heading_text(inner);
    if title.is_empty() {
        return caps[0].to_string();
    }

    let existing_id = ID_ATTR
        .captures(attrs)
        .map(|c| decode_entities(&c[1]))
        .filter(|id| !id.is_empty());
    let base = existing_id.unwrap_or_else(|| slugify(&title));
    if base.is_empty() {
        return caps[0].to_string();
    }

    let base = format!("{ANCHOR_PREFIX}{base}");
    let mut hash = base.clone();
    let mut n = 1;
    while used.contains(&hash) {
        hash = format!("{base}-{n}");
        n += 1;
    }
    used.insert(hash.clone());

    let other_attrs = ID_ATTR.replace_all(attrs, "");
    let escaped = escape_attr(&hash);
    subtitles.push(DocSubtitle {
        title,
        hash: hash.clone(),
    });

    format!(
        "<h{level}{other_attrs} id=\"{escaped}\">{inner}<a class=\"heading-anchor\" href=\"#{escaped}\">#</a></h{level}>"
    )
}

/// Reads the table of contents back out of HTML produced by [`render`]:
/// every heading that carries an id, in document order.
pub fn table_of_contents(html: &str) -> DocMetadata {
    let subtitles = HEADING
        .captures_iter(html)
        .filter_map(|caps| {
            let hash = ID_ATTR
                .captures(&caps[2])
                .map(|c| decode_entities(&c[1]))
                .filter(|id| !id.is_empty())?;
            let title = heading_text(&SELF_LINK.replace_all(&caps[3], ""));
            (!title.is_empty()).then_some(DocSubtitle { title, hash })
        })
        .collect();
    DocMetadata { subtitles }
}

/// Lowercases, drops everything but word characters and whitespace,
/// hyphenates whitespace runs and keeps at most 50 characters.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    let hyphenated = WHITESPACE.replace_all(&stripped, "-");
    hyphenated.chars().take(MAX_ANCHOR_SLUG_LEN).collect()
}

/// Text content of an HTML fragment for the search index. Block boundaries
/// become spaces.
pub fn plain_text(html: &str) -> String {
    collapse_text(&TAG.replace_all(html, " "))
}

/// Text of inline heading markup. Adjacent text nodes join without a space,
/// so `Rust<strong>acean</strong>` reads as `Rustacean`.
pub fn heading_text(html: &str) -> String {
    collapse_text(&TAG.replace_all(html, ""))
}

fn collapse_text(text: &str) -> String {
    let decoded = decode_entities(text);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
