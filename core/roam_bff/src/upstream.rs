use std::sync::Arc;

use axum::http::{header, StatusCode};
use reqwest::{redirect::Policy, Client, Response};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{config::Config, datalog::DatalogQuery, error::UpstreamError};

/// Caller for the Roam graph API. The only place redirects and shard misses are handled.
#[derive(Clone)]
pub struct RoamClient {
    http: Client,
    config: Arc<Config>,
}

impl RoamClient {
    pub fn new(config: Arc<Config>) -> reqwest::Result<Self> {
        let http = Client::builder()
            .redirect(Policy::none())
            .timeout(config.upstream_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    async fn send(&self, url: &str, token: &str, body: &[u8]) -> Result<Response, UpstreamError> {
        let bearer = format!("Bearer {token}");
        self.http
            .post(url)
            .header(header::AUTHORIZATION, &bearer)
            .header("x-authorization", &bearer)
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.to_string(),
                source,
            })
    }

    /// One attempt against `url`, following at most one 308 to its `Location`.
    pub async fn post(&self, url: &str, token: &str, body: &[u8]) -> Result<String, UpstreamError> {
        let mut res = self.send(url, token, body).await?;
        let mut served_by = url.to_string();

        if res.status() == StatusCode::PERMANENT_REDIRECT {
            let location = res
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| res.url().join(loc).ok());
            if let Some(location) = location {
                debug!("following redirect {url} -> {location}");
                served_by = location.to_string();
                res = self.send(location.as_str(), token, body).await?;
            }
        }

        let status = res.status();
        let text = res.text().await.map_err(|source| UpstreamError::Transport {
            url: served_by.clone(),
            source,
        })?;
        if status.is_success() {
            return Ok(text);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::ShardMiss { url: served_by });
        }
        Err(UpstreamError::Status { status, body: text })
    }

    /// Raw `/q` call; reads never leave the primary host.
    pub async fn query_raw(
        &self,
        graph: &str,
        token: &str,
        query: &DatalogQuery,
    ) -> Result<String, UpstreamError> {
        let url = self.config.query_url(graph);
        let body = serde_json::to_vec(&json!({ "query": query.query, "args": query.args }))
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        let attempts = 1 + self.config.read_retries;
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.post(&url, token, &body).await {
                Ok(text) => return Ok(text),
                Err(err @ UpstreamError::ShardMiss { .. }) => {
                    info!("query attempt {attempt}/{attempts}: {err}");
                    last = err.to_string();
                }
                Err(err) => return Err(err),
            }
        }
        Err(UpstreamError::Exhausted { last })
    }

    pub async fn query(
        &self,
        graph: &str,
        token: &str,
        query: &DatalogQuery,
    ) -> Result<Value, UpstreamError> {
        let text = self.query_raw(graph, token, query).await?;
        serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Forwards a write payload to the primary `/write`, then to each peer until one accepts it.
    pub async fn write(&self, graph: &str, token: &str, payload: &Value) -> Result<(), UpstreamError> {
        let body = serde_json::to_vec(payload).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        let mut last: Option<String> = None;
        for url in self.config.write_urls(graph) {
            match self.post(&url, token, &body).await {
                Ok(_) => {
                    info!("write accepted by {url}");
                    return Ok(());
                }
                Err(err @ UpstreamError::ShardMiss { .. }) => {
                    debug!("{err}, trying next host");
                }
                Err(err) => {
                    warn!("write to {url} failed: {err}");
                    last = Some(err.to_string());
                }
            }
        }
        Err(UpstreamError::Exhausted {
            last: last.unwrap_or_else(|| format!("no host owns graph {graph}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::HeaderMap,
        response::{IntoResponse, Response as AxumResponse},
        routing::post,
        Router,
    };
    use std::{
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, peers: &[&str]) -> RoamClient {
        let mut cfg = Config::new(Some("tok".into()));
        cfg.api_base = format!("http://{addr}/api/graph");
        cfg.peer_bases = peers.iter().map(|p| format!("http://{addr}/{p}/api/graph")).collect();
        RoamClient::new(Arc::new(cfg)).unwrap()
    }

    #[derive(Clone)]
    struct Hops {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    async fn redirect_forever(State(h): State<Hops>) -> AxumResponse {
        h.hits.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::PERMANENT_REDIRECT,
            [(header::LOCATION, format!("http://{}/api/graph/g/q", h.addr))],
        )
            .into_response()
    }

    #[tokio::test]
    async fn redirect_is_followed_exactly_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hops = Hops {
            addr,
            hits: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/api/graph/:graph/q", post(redirect_forever))
            .with_state(hops.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client_for(addr, &[]);
        let err = client
            .post(&format!("http://{addr}/api/graph/g/q"), "tok", b"{}")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status { status: StatusCode::PERMANENT_REDIRECT, .. }
        ));
        assert_eq!(hops.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bearer_token_is_sent_to_upstream() {
        async fn check(headers: HeaderMap) -> AxumResponse {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if auth == "Bearer tok" {
                (StatusCode::OK, r#"{"result":[]}"#).into_response()
            } else {
                StatusCode::UNAUTHORIZED.into_response()
            }
        }
        let addr = serve(Router::new().route("/api/graph/:graph/q", post(check))).await;
        let client = client_for(addr, &[]);
        let q = crate::datalog::pages_query();
        let v = client.query("g", "tok", &q).await.unwrap();
        assert_eq!(v, json!({"result": []}));
    }

    #[tokio::test]
    async fn shard_misses_on_reads_exhaust_after_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/graph/:graph/q",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }
            }),
        );
        let addr = serve(app).await;
        let client = client_for(addr, &["peer1"]);
        let err = client
            .query_raw("g", "tok", &crate::datalog::pages_query())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Exhausted { .. }));
        // Default config allows one retry on the primary and never touches peers.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn writes_that_only_miss_report_no_owner() {
        let app = Router::new()
            .route("/api/graph/:graph/write", post(|| async { StatusCode::NOT_FOUND }))
            .route("/peer1/api/graph/:graph/write", post(|| async { StatusCode::NOT_FOUND }));
        let addr = serve(app).await;
        let client = client_for(addr, &["peer1"]);
        let err = client
            .write("g", "tok", &json!({"action": "create-block"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "All Roam endpoints failed: no host owns graph g");
    }
}
