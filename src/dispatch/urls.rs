//! Builders for the URLs embedded in outgoing email.

use anyhow::{Context, Result};
use reqwest::Url;

fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let base = Url::parse(base_url).with_context(|| format!("invalid base URL '{base_url}'"))?;
    base.join(path)
        .with_context(|| format!("cannot append '{path}' to '{base_url}'"))
}

/// `<base>/track?api_key=..&uid=<campaign id>`
pub fn pixel_url(base_url: &str, api_key: &str, campaign_id: i64) -> Result<Url> {
    let mut url = endpoint(base_url, "track")?;
    url.query_pairs_mut()
        .append_pair("api_key", api_key)
        .append_pair("uid", &campaign_id.to_string());
    Ok(url)
}

/// `<base>/click?api_key=..&uid=<link id>&url=<destination>`
pub fn click_url(base_url: &str, api_key: &str, link_id: i64, destination: &str) -> Result<Url> {
    let mut url = endpoint(base_url, "click")?;
    url.query_pairs_mut()
        .append_pair("api_key", api_key)
        .append_pair("uid", &link_id.to_string())
        .append_pair("url", destination);
    Ok(url)
}

/// `<img>` tag for the tracking pixel, ready to paste into an HTML email.
pub fn pixel_tag(pixel_url: &Url) -> String {
    format!(
        r#"<img src="{}" width="1" height="1" alt="" style="display:none;border:0" />"#,
        pixel_url.as_str().replace('&', "&amp;")
    )
}
