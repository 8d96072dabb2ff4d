//! Tracker result-page parsing

use felarr_core::{FelarrError, ReleaseRecord, Result};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Parse the torrent rows of a search result page.
///
/// Each row is expected to carry a details link (the stable identifier
/// comes from its id query parameter or trailing path segment) and a
/// download link, which is resolved against the page base.
pub fn parse_releases(body: &str, base_url: &Url) -> Result<Vec<ReleaseRecord>> {
    let document = Html::parse_document(body);

    let row_selector = selector("table#torrents tr, table.torrents tr")?;
    let details_selector = selector("a[href*='/details.php'], a[href*='/t/']")?;
    let download_selector = selector("a[href*='/download.php'], a[href^='magnet:']")?;

    let mut releases = Vec::new();

    for row in document.select(&row_selector) {
        let Some(details) = row.select(&details_selector).next() else {
            continue;
        };
        let Some(download) = row.select(&download_selector).next() else {
            continue;
        };

        let title = details.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let details_href = details.value().attr("href").unwrap_or_default();
        let Some(identifier) = extract_identifier(details_href) else {
            continue;
        };

        let download_href = download.value().attr("href").unwrap_or_default();
        let link = if download_href.starts_with("magnet:") {
            download_href.to_string()
        } else {
            match base_url.join(download_href) {
                Ok(url) => url.to_string(),
                Err(_) => continue,
            }
        };

        releases.push(ReleaseRecord {
            identifier,
            title,
            link,
            published_at: None,
        });
    }

    debug!(count = releases.len(), "parsed tracker result rows");
    Ok(releases)
}

fn selector(rule: &str) -> Result<Selector> {
    Selector::parse(rule).map_err(|e| FelarrError::malformed("tracker", format!("{e:?}")))
}

/// Stable identifier from a details link: the `id` query parameter when
/// present, otherwise the last non-empty path segment.
fn extract_identifier(href: &str) -> Option<String> {
    if let Some(query) = href.split('?').nth(1) {
        for pair in query.split('&') {
            if let Some(id) = pair.strip_prefix("id=") {
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }

    href.split('?')
        .next()?
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .filter(|segment| *segment != "details.php")
        .map(|segment| segment.to_string())
}
