//! Server list retrieval and preprocessing

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::Server;
use reqwest::Client;
use std::io::Read;
use std::path::Path;
use url::Url;

/// Suffix tried when a list URL does not answer with a server list
pub const WELL_KNOWN_SUFFIX: &str = "/.well-known/librespeed";

/// Server id that selects every server in a `--server` list
pub const ALL_SERVERS: i64 = -1;

/// How a freshly loaded list is normalized and narrowed down
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFilter {
    /// Force https on every base URL
    pub secure: bool,
    pub exclude: Vec<i64>,
    pub specific: Vec<i64>,
    /// Listing shows every server, so filters are skipped
    pub apply: bool,
}

impl ServerFilter {
    pub fn validate(&self) -> Result<()> {
        if !self.exclude.is_empty() && !self.specific.is_empty() {
            return Err(AppError::validation("either --exclude or --server can be used"));
        }
        Ok(())
    }
}

/// Fetch the list from `url`, retrying once under the well-known path
pub async fn fetch_server_list(client: &Client, url: &str, filter: &ServerFilter, logger: &Logger) -> Result<Vec<Server>> {
    filter.validate()?;

    logger.info("Retrieving server list").field("url", url).log().await;
    match fetch_once(client, url).await {
        Ok(servers) => preprocess(servers, filter),
        Err(first) => {
            let retry = format!("{}{}", url.trim_end_matches('/'), WELL_KNOWN_SUFFIX);
            logger
                .info("Retry with /.well-known/librespeed")
                .field("error", first.to_string())
                .log()
                .await;
            let servers = fetch_once(client, &retry).await?;
            preprocess(servers, filter)
        }
    }
}

async fn fetch_once(client: &Client, url: &str) -> Result<Vec<Server>> {
    let body = client.get(url).send().await?.error_for_status()?.text().await?;
    parse_server_list(&body)
}

/// Load the list from a file, or from stdin when `source` is `-`
pub fn load_local(source: &str, filter: &ServerFilter) -> Result<Vec<Server>> {
    filter.validate()?;

    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        let path = Path::new(source);
        std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Cannot read server list {}: {}", path.display(), e)))?
    };

    preprocess(parse_server_list(&content)?, filter)
}

pub fn parse_server_list(json: &str) -> Result<Vec<Server>> {
    serde_json::from_str(json).map_err(|e| AppError::parse(format!("Invalid server list: {}", e)))
}

/// Normalize base URLs and apply the id filters
pub fn preprocess(mut servers: Vec<Server>, filter: &ServerFilter) -> Result<Vec<Server>> {
    filter.validate()?;

    for server in servers.iter_mut() {
        server.server = normalize_base(&server.server, filter.secure)?;
    }

    if !filter.apply {
        return Ok(servers);
    }

    if !filter.exclude.is_empty() {
        servers.retain(|s| !filter.exclude.contains(&s.id));
    } else if !filter.specific.is_empty() && !filter.specific.contains(&ALL_SERVERS) {
        servers.retain(|s| filter.specific.contains(&s.id));
    }

    Ok(servers)
}

/// Scheme-relative URLs get `http`, or `https` with `secure`
fn normalize_base(raw: &str, secure: bool) -> Result<String> {
    let candidate = if raw.starts_with("//") {
        format!("{}:{}", if secure { "https" } else { "http" }, raw)
    } else {
        raw.to_string()
    };

    let mut url = Url::parse(&candidate).map_err(|e| AppError::parse(format!("Invalid server URL '{}': {}", raw, e)))?;
    if secure && url.scheme() != "https" && url.set_scheme("https").is_err() {
        return Err(AppError::validation(format!("Cannot force https on '{}'", raw)));
    }
    Ok(url.to_string())
}

/// Lines printed by `--list`
pub fn format_list(servers: &[Server]) -> Vec<String> {
    servers
        .iter()
        .map(|s| {
            let sponsor = s.sponsor();
            let sponsor = if sponsor.is_empty() {
                String::new()
            } else {
                format!(" [Sponsor: {}]", sponsor)
            };
            format!("{}: {} ({}){}", s.id, s.name, s.server, sponsor)
        })
        .collect()
}
