use crate::scraper::ScrapeError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

// ── Selector helpers ──────────────────────────────────────────────────────────

pub fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

/// Whitespace-collapsed text of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching any candidate, in order. Empty matches are skipped.
pub fn first_text(doc: &Html, candidates: &[&str]) -> Result<Option<String>, ScrapeError> {
    for css in candidates {
        let sel = selector(css)?;
        if let Some(text) = doc
            .select(&sel)
            .map(element_text)
            .find(|t| !t.is_empty())
        {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Attribute of the first element matching `css` that carries it.
pub fn first_attr(doc: &Html, css: &str, attr: &str) -> Result<Option<String>, ScrapeError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .find_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Texts of every element matching `css`, joined with single spaces.
pub fn joined_text(doc: &Html, css: &str) -> Result<String, ScrapeError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

// ── Listing page ──────────────────────────────────────────────────────────────

/// Article links from an index page: for each `item` element, the `href` of its
/// first `link` descendant, resolved against `base` and de-duplicated in page order.
pub fn listing_links(
    html: &str,
    base: &Url,
    item: &str,
    link: &str,
) -> Result<Vec<String>, ScrapeError> {
    let doc = Html::parse_document(html);
    let item_sel = selector(item)?;
    let link_sel = selector(link)?;

    let mut urls: Vec<String> = Vec::new();
    for el in doc.select(&item_sel) {
        let Some(href) = el
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else { continue };
        let resolved = resolved.to_string();
        if !urls.contains(&resolved) {
            urls.push(resolved);
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <div class="post-listing">
          <article class="post"><h2 class="entry-title"><a href="/2024/05/a/">A</a></h2></article>
          <article class="post"><h2 class="entry-title"><a href="https://nairametrics.com/2024/05/b/">B</a></h2></article>
          <article class="post"><h2 class="entry-title"><a href="/2024/05/a/">A again</a></h2></article>
          <article class="post"><h2 class="entry-title">no link</h2></article>
        </div>"#;

    #[test]
    fn listing_links_resolve_and_dedupe() {
        let base = Url::parse("https://nairametrics.com").unwrap();
        let urls = listing_links(
            LISTING,
            &base,
            "div.post-listing article.post",
            "h2.entry-title a",
        )
        .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://nairametrics.com/2024/05/a/",
                "https://nairametrics.com/2024/05/b/",
            ]
        );
    }

    #[test]
    fn first_text_falls_through_candidates() {
        let doc = Html::parse_document("<h1 class='x'>  </h1><h2>  Second\n  title </h2>");
        let text = first_text(&doc, &["h1.x", "h2"]).unwrap();
        assert_eq!(text.as_deref(), Some("Second title"));
        assert_eq!(first_text(&doc, &["h3"]).unwrap(), None);
    }

    #[test]
    fn bad_selector_is_reported() {
        let err = selector("div[").unwrap_err();
        assert!(matches!(err, ScrapeError::Selector { .. }));
    }
}
