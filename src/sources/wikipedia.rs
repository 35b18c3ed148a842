//! Box office figures scraped from a Wikipedia article's infobox.

use crate::error::EnrichError;
use crate::sources::check_status;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static TH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("valid selector"));

/// The text of the cell next to the first `<th>` mentioning "Box office".
///
/// Newlines inside the cell become spaces; an empty cell yields `None`.
pub fn extract_box_office(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let header = document
        .select(&TH_SELECTOR)
        .find(|th| th.text().collect::<String>().contains("Box office"))?;
    let cell = header
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")?;
    let value = cell.text().collect::<String>().trim().replace('\n', " ");
    (!value.is_empty()).then_some(value)
}

/// Fetch `page_url` and extract its box office figure.
#[instrument(level = "debug", skip(client))]
pub async fn fetch_box_office(client: &reqwest::Client, page_url: &str) -> Result<Option<String>, EnrichError> {
    let resp = client.get(page_url).send().await?;
    let html = check_status(resp, "wikipedia")?.text().await?;
    let value = extract_box_office(&html);
    debug!(found = value.is_some(), "Scraped box office");
    Ok(value)
}
