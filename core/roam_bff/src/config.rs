use std::{fmt, time::Duration};

use clap::ValueEnum;
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.roamresearch.com/api/graph";
pub const DEFAULT_PEERS: [&str; 3] = [
    "peer-24.api.roamresearch.com:3001",
    "peer-25.api.roamresearch.com:3001",
    "peer-23.api.roamresearch.com:3001",
];
pub const DEFAULT_CATEGORIES_PAGE: &str = "Time Categories";
pub const DEFAULT_TIMELINE_BLOCK: &str = "Timeline";

/// How a `#tag` on a timeline entry is matched against the category tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryMatch {
    /// `#SubA` matches any node named `SubA` (or `[[SubA]]`).
    Leaf,
    /// `#Work/SubA` matches the node `SubA` under the root `Work`.
    Path,
}

/// Server-side configuration, built once at startup and shared read-only.
#[derive(Clone)]
pub struct Config {
    pub api_token: Option<String>,
    pub api_base: String,
    /// Graph API bases of the write peers, e.g. `https://peer-24.api.roamresearch.com:3001/api/graph`.
    pub peer_bases: Vec<String>,
    pub categories_page: String,
    pub timeline_block: String,
    /// Levels of `:block/children` pulled below each category block.
    pub category_depth: usize,
    pub category_match: CategoryMatch,
    pub stats_concurrency: usize,
    /// Extra attempts on the primary `/q` endpoint after a shard miss.
    pub read_retries: usize,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            api_base: DEFAULT_API_BASE.to_string(),
            peer_bases: DEFAULT_PEERS.iter().map(|p| peer_base(p)).collect(),
            categories_page: DEFAULT_CATEGORIES_PAGE.to_string(),
            timeline_block: DEFAULT_TIMELINE_BLOCK.to_string(),
            category_depth: 2,
            category_match: CategoryMatch::Leaf,
            stats_concurrency: 4,
            read_retries: 1,
            upstream_timeout: Duration::from_secs(30),
        }
    }

    pub fn query_url(&self, graph: &str) -> String {
        format!("{}/{graph}/q", self.api_base.trim_end_matches('/'))
    }

    /// Primary write endpoint first, then every peer, in order.
    pub fn write_urls(&self, graph: &str) -> Vec<String> {
        std::iter::once(self.api_base.as_str())
            .chain(self.peer_bases.iter().map(String::as_str))
            .map(|base| format!("{}/{graph}/write", base.trim_end_matches('/')))
            .collect()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("peer_bases", &self.peer_bases)
            .field("categories_page", &self.categories_page)
            .field("timeline_block", &self.timeline_block)
            .field("category_depth", &self.category_depth)
            .field("category_match", &self.category_match)
            .field("stats_concurrency", &self.stats_concurrency)
            .field("read_retries", &self.read_retries)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

/// A peer is either a bare `host:port` (reached over https) or a full graph API base URL.
pub fn peer_base(peer: &str) -> String {
    let peer = peer.trim().trim_end_matches('/');
    if peer.contains("://") {
        peer.to_string()
    } else {
        format!("https://{peer}/api/graph")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_urls_try_primary_then_peers() {
        let cfg = Config::new(Some("t".into()));
        let urls = cfg.write_urls("Mineworld");
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[0], "https://api.roamresearch.com/api/graph/Mineworld/write");
        assert_eq!(
            urls[1],
            "https://peer-24.api.roamresearch.com:3001/api/graph/Mineworld/write"
        );
        assert_eq!(
            urls[3],
            "https://peer-23.api.roamresearch.com:3001/api/graph/Mineworld/write"
        );
        assert_eq!(
            cfg.query_url("Mineworld"),
            "https://api.roamresearch.com/api/graph/Mineworld/q"
        );
    }

    #[test]
    fn peer_base_keeps_full_urls() {
        assert_eq!(
            peer_base("http://127.0.0.1:9000/peer1/api/graph/"),
            "http://127.0.0.1:9000/peer1/api/graph"
        );
        assert_eq!(
            peer_base(" peer-1.api.roamresearch.com:3001 "),
            "https://peer-1.api.roamresearch.com:3001/api/graph"
        );
    }

    #[test]
    fn blank_token_counts_as_missing() {
        assert!(Config::new(Some("   ".into())).api_token.is_none());
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = Config::new(Some("roam-graph-token-secret".into()));
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
