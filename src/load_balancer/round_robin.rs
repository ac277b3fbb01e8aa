//! Weighted round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::{Position, Url};

use crate::load_balancer::{BalancerHandler, LoadBalancerError};

#[derive(Debug, Clone)]
struct Server {
    url: Url,
    weight: u32,
}

/// Round-robin selector where each server gets `weight` consecutive slots
/// out of every rotation.
pub struct WeightedRoundRobin {
    servers: RwLock<Vec<Server>>,
    counter: AtomicUsize,
    client: Client<HttpConnector, Body>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(client)
    }

    /// Build a balancer that forwards through an existing client.
    pub fn with_client(client: Client<HttpConnector, Body>) -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
            counter: AtomicUsize::new(0),
            client,
        }
    }

    /// Pick the next server, or `None` when the balancer is empty.
    pub fn next_server(&self) -> Option<Url> {
        let servers = self.servers.read().unwrap_or_else(PoisonError::into_inner);
        let total: u64 = servers.iter().map(|s| u64::from(s.weight)).sum();
        if total == 0 {
            return None;
        }

        let slot = self.counter.fetch_add(1, Ordering::Relaxed) as u64 % total;
        let mut upper = 0u64;
        for server in servers.iter() {
            upper += u64::from(server.weight);
            if slot < upper {
                return Some(server.url.clone());
            }
        }
        None
    }

    /// Weight of a server, if present.
    pub fn weight(&self, url: &Url) -> Option<u32> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| &s.url == url)
            .map(|s| s.weight)
    }
}

impl Default for WeightedRoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalancerHandler for WeightedRoundRobin {
    fn servers(&self) -> Vec<Url> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.url.clone())
            .collect()
    }

    fn upsert_server(&self, url: &Url, weight: u32) -> Result<(), LoadBalancerError> {
        if weight == 0 {
            return Err(LoadBalancerError::InvalidWeight(weight));
        }

        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        match servers.iter_mut().find(|s| &s.url == url) {
            Some(existing) => existing.weight = weight,
            None => servers.push(Server {
                url: url.clone(),
                weight,
            }),
        }
        Ok(())
    }

    fn remove_server(&self, url: &Url) -> Result<(), LoadBalancerError> {
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        match servers.iter().position(|s| &s.url == url) {
            Some(index) => {
                servers.remove(index);
                Ok(())
            }
            None => Err(LoadBalancerError::ServerNotFound(url.clone())),
        }
    }

    async fn serve(&self, request: Request<Body>) -> Response<Body> {
        let Some(target) = self.next_server() else {
            tracing::warn!(path = %request.uri().path(), "No servers available");
            return (StatusCode::SERVICE_UNAVAILABLE, "No servers available").into_response();
        };

        let (mut parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let uri = match Uri::builder()
            .scheme(target.scheme())
            .authority(&target[Position::BeforeHost..Position::AfterPort])
            .path_and_query(path_and_query)
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(server = %target, error = %e, "Failed to rewrite request URI");
                return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
            }
        };
        parts.uri = uri;
        // Let the client derive Host from the rewritten URI.
        parts.headers.remove(header::HOST);

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => response.map(Body::new),
            Err(e) => {
                tracing::error!(server = %target, error = %e, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}
