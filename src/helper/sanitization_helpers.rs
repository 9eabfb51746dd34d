use std::collections::HashSet;

use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};

/// Renders post Markdown to HTML and sanitizes the result. The output is
/// what gets cached in `content_html`; the Markdown source stays the
/// editable record. All scripting capabilities (`onclick`, `onerror`,
/// `<script>`) are removed, a safe subset of tags and attributes survives.
pub fn render_markdown(markdown_input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown_input, options);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);

    let tags_to_allow = [
        "h1", "h2", "h3", "h4", "h5", "h6", "b", "strong", "i", "em", "p", "br",
        "a", "ul", "ol", "li", "blockquote", "code", "pre", "hr", "img", "table",
        "thead", "tbody", "tr", "th", "td", "s", "del", "video", "div",
    ];
    let safe_tags = tags_to_allow.iter().cloned().collect::<HashSet<_>>();

    let safe_attributes = [
        "src", "href", "alt", "title", "class", "style", "controls", "width", "height", "align",
    ];
    let generic_attributes = safe_attributes.iter().cloned().collect::<HashSet<_>>();

    Builder::new()
        .tags(safe_tags)
        .generic_attributes(generic_attributes)
        .link_rel(Some("nofollow ugc"))
        .clean(&unsafe_html)
        .to_string()
}

/// Strips all HTML tags from a string, leaving only the plain text
/// content. Used for fields like titles and excerpts where no markup
/// belongs at all.
pub fn strip_all_html(input: &str) -> String {
    Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Derives a URL slug from a display name: lowercased, transliterated to
/// ASCII, words joined by hyphens.
pub fn derive_slug(name: &str) -> String {
    slug::slugify(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_renders_to_sanitized_html() {
        let rendered = render_markdown("# Heading\n\nSome **bold** text.");
        assert!(rendered.contains("<h1>Heading</h1>"));
        assert!(rendered.contains("<strong>bold</strong>"));
    }

    #[test]
    fn script_tags_never_survive_rendering() {
        let rendered = render_markdown("Hello <script>alert('xss')</script> world");
        assert!(!rendered.contains("<script>"));
        assert!(!rendered.contains("alert"));
    }

    #[test]
    fn event_handler_attributes_are_dropped() {
        let rendered = render_markdown("<img src=\"x.png\" onerror=\"steal()\">");
        assert!(rendered.contains("src=\"x.png\""));
        assert!(!rendered.contains("onerror"));
    }

    #[test]
    fn links_gain_nofollow_rel() {
        let rendered = render_markdown("[site](https://example.com)");
        assert!(rendered.contains("rel=\"nofollow ugc\""));
    }

    #[test]
    fn tables_are_supported() {
        let rendered = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(rendered.contains("<table>"));
        assert!(rendered.contains("<td>1</td>"));
    }

    #[test]
    fn stripping_leaves_plain_text_only() {
        assert_eq!(
            strip_all_html("Plain <b>bold</b> and <script>bad()</script>"),
            "Plain bold and "
        );
    }

    #[test]
    fn slugs_transliterate_accents() {
        assert_eq!(derive_slug("Conférence Annuelle"), "conference-annuelle");
        assert_eq!(derive_slug("  Offre   de thèse 2026  "), "offre-de-these-2026");
    }
}
