//! HTML noise stripping and size capping
//!
//! Pages are reduced before anything is sent to the generative backend:
//! - scripts, styles and other non-content elements are dropped
//! - comments are dropped
//! - only the main content region is kept when one can be found
//! - oversized output is narrowed to product-like containers, then cut

use scraper::{ElementRef, Html, Node, Selector};

/// Elements that never carry page content
const NOISE_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "meta", "link", "template", "svg", "iframe",
];

/// Elements serialized without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Candidate main-content regions, most specific first
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    ".main",
    "#main",
    ".content",
    "#content",
    ".products",
    ".product-list",
    ".product-grid",
    ".search-results",
    ".catalog",
    "section",
    "article",
];

/// Class keywords marking product-like containers
const CONTAINER_KEYWORDS: &[&str] = &["product", "item", "tile", "card"];

/// How many product-like containers survive truncation
const MAX_FOCUSED_CONTAINERS: usize = 20;

/// Strips noise from a page and returns the serialized main content region
pub fn denoise(html: &str) -> String {
    let document = Html::parse_document(html);
    let region = main_region(&document);
    let mut out = String::with_capacity(html.len().min(1 << 20));
    write_element(region, &mut out);
    out
}

/// Denoises and caps the result at `max_chars` characters
///
/// When the denoised region is too large, the output is rebuilt from the
/// first product-like containers before the final cut.
pub fn denoise_and_truncate(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let region = main_region(&document);

    let mut cleaned = String::new();
    write_element(region, &mut cleaned);

    if cleaned.chars().count() > max_chars {
        let containers = product_containers(region);
        if !containers.is_empty() {
            let mut focused = String::from("<div>");
            for container in containers {
                write_element(container, &mut focused);
            }
            focused.push_str("</div>");
            cleaned = focused;
        }
    }

    truncate_chars(&cleaned, max_chars).to_string()
}

/// Counts non-whitespace characters of visible body text
///
/// A page rendered by client-side script arrives as a near-empty shell.
pub fn visible_text_chars(html: &str) -> usize {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .unwrap_or_else(|| document.root_element());

    count_text(root)
}

/// Returns the longest prefix of `s` holding at most `max_chars` characters
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn main_region(document: &Html) -> ElementRef<'_> {
    for selector in MAIN_CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(element) = document.select(&sel).next() {
                return element;
            }
        }
    }

    Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .unwrap_or_else(|| document.root_element())
}

/// Outermost elements whose class mentions a product-ish keyword, in document order
fn product_containers(region: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut found = Vec::new();
    let mut stack: Vec<ElementRef<'_>> = element_children(region).rev().collect();

    while let Some(element) = stack.pop() {
        if found.len() >= MAX_FOCUSED_CONTAINERS {
            break;
        }
        if is_noise(element.value().name()) {
            continue;
        }
        if has_container_class(element) {
            found.push(element);
        } else {
            stack.extend(element_children(element).rev());
        }
    }
    found
}

fn element_children<'a>(
    element: ElementRef<'a>,
) -> impl DoubleEndedIterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn has_container_class(element: ElementRef<'_>) -> bool {
    element
        .value()
        .attr("class")
        .map(|class| {
            let class = class.to_lowercase();
            CONTAINER_KEYWORDS.iter().any(|k| class.contains(k))
        })
        .unwrap_or(false)
}

fn is_noise(name: &str) -> bool {
    NOISE_ELEMENTS.contains(&name)
}

/// Pending serialization work; the DOM is walked with an explicit stack
enum Step<'a> {
    Open(ElementRef<'a>),
    Text(&'a str),
    Close(&'a str),
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let mut stack = vec![Step::Open(element)];

    while let Some(step) = stack.pop() {
        let element = match step {
            Step::Text(text) => {
                escape_into(text, false, out);
                continue;
            }
            Step::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
                continue;
            }
            Step::Open(element) => element,
        };

        let name = element.value().name();
        if is_noise(name) {
            continue;
        }

        out.push('<');
        out.push_str(name);
        for (attr, value) in element.value().attrs() {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            continue;
        }

        stack.push(Step::Close(name));
        for child in element.children().rev() {
            match child.value() {
                Node::Text(text) => stack.push(Step::Text(&**text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        stack.push(Step::Open(child));
                    }
                }
                _ => {}
            }
        }
    }
}

fn count_text(root: ElementRef<'_>) -> usize {
    let mut count = 0;
    let mut stack = vec![root];

    while let Some(element) = stack.pop() {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => count += text.chars().filter(|c| !c.is_whitespace()).count(),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        if !is_noise(child.value().name()) {
                            stack.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    count
}

fn escape_into(text: &str, in_attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
