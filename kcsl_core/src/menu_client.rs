//! This client finds the menu documents on the city website and mirrors them.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{
    header::{IF_MODIFIED_SINCE, LAST_MODIFIED},
    Client, StatusCode, Url,
};
use scraper::{Html, Selector};
use tracing::{debug, info};

static CONTENTS: &str = "#tmp_contents";
static DOCUMENT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+-[^/]+$").expect("valid document link regex"));
static MONTH_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)月").expect("valid month heading regex"));

/// A menu document linked from the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDocument {
    pub url: String,
    /// The month of the heading the link is listed under.
    pub month: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { last_modified: Option<String> },
    NotModified,
    Failed(StatusCode),
}

pub fn build_client(user_agent: &str) -> Result<Client> {
    Ok(Client::builder().user_agent(user_agent).build()?)
}

/// Get every menu document linked from the listing page.
pub async fn discover(client: &Client, listing_url: &str) -> Result<Vec<ListedDocument>> {
    let base = Url::parse(listing_url)?;
    let html = client
        .get(base.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("fetching listing {listing_url}"))?
        .text()
        .await?;
    let documents = parse_listing(&html, &base);
    info!(count = documents.len(), "discovered menu documents");
    Ok(documents)
}

/// Walk headings and links in document order, labelling each link with the latest month.
fn parse_listing(html: &str, base: &Url) -> Vec<ListedDocument> {
    let dom = Html::parse_document(html);
    let selector =
        Selector::parse(&format!("h2, {CONTENTS} a[href]")).expect("valid listing selector");
    let mut month = None;
    let mut documents = vec![];
    for element in dom.select(&selector) {
        let text = element.text().collect::<String>();
        if element.value().name() == "h2" {
            month = MONTH_HEADING
                .captures(&text)
                .and_then(|captures| captures[1].parse::<u32>().ok());
            continue;
        }
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| base.join(href).ok())
        else {
            continue;
        };
        if !DOCUMENT_LINK.is_match(url.path()) {
            continue;
        }
        let Some(month) = month else {
            debug!(%url, "link without month heading");
            continue;
        };
        documents.push(ListedDocument {
            url: url.to_string(),
            month,
            title: text.trim().to_string(),
        });
    }
    documents
}

/// Mirror `url` into `target`.
///
/// With a previous `last_modified` and an existing `target` the request is conditional.
pub async fn download(
    client: &Client,
    url: &str,
    target: &Path,
    last_modified: Option<&str>,
) -> Result<FetchOutcome> {
    let mut request = client.get(url);
    if let Some(last_modified) = last_modified.filter(|_| target.exists()) {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?;
    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        return Ok(FetchOutcome::NotModified);
    }
    if !status.is_success() {
        return Ok(FetchOutcome::Failed(status));
    }
    info!(url, "downloading");
    let last_modified = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .map(String::from);
    let body = response.bytes().await?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, &body).with_context(|| format!("writing {}", target.display()))?;
    Ok(FetchOutcome::Downloaded { last_modified })
}
