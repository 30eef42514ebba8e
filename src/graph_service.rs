use async_trait::async_trait;
use serde_json::Value;

use crate::error::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A single call against the graph service. Path segments are kept unencoded;
/// the transport percent-encodes them.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl GraphRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { method, segments: segments.into_iter().map(Into::into).collect(), query: Vec::new(), body: None }
    }

    pub fn get<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self { Self::new(Method::Get, segments) }
    pub fn post<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self { Self::new(Method::Post, segments) }
    pub fn patch<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self { Self::new(Method::Patch, segments) }
    pub fn delete<I: IntoIterator<Item = S>, S: Into<String>>(segments: I) -> Self { Self::new(Method::Delete, segments) }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Unencoded path, for logs and assertions.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

#[async_trait]
pub trait GraphService: Send + Sync {
    async fn send(&self, req: GraphRequest) -> Result<Value, UpstreamError>;
}

#[derive(Clone)]
pub struct HttpGraphService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGraphService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }

    fn build_url(&self, req: &GraphRequest) -> Result<url::Url, UpstreamError> {
        let mut url = url::Url::parse(&self.base_url).map_err(|e| UpstreamError::Request(format!("invalid base url {}: {}", self.base_url, e)))?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| UpstreamError::Request(format!("base url {} cannot carry a path", self.base_url)))?;
            segs.pop_if_empty();
            segs.extend(req.segments.iter());
        }
        if !req.query.is_empty() {
            url.query_pairs_mut().extend_pairs(req.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl GraphService for HttpGraphService {
    async fn send(&self, req: GraphRequest) -> Result<Value, UpstreamError> {
        let url = self.build_url(&req)?;
        let mut rb = match req.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Patch => self.client.patch(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await.map_err(|e| {
            if e.is_builder() {
                UpstreamError::Request(e.to_string())
            } else {
                UpstreamError::Unreachable { base: self.base_url.clone() }
            }
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|_| UpstreamError::Unreachable { base: self.base_url.clone() })?;
        if !status.is_success() {
            return Err(UpstreamError::Rejected { status: status.as_u16(), detail: error_detail(&text, status) });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// FastAPI-style services put the reason under `detail`; fall back to the raw
/// body, then to the canonical status text.
fn error_detail(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        match v.get("detail") {
            Some(Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    status.canonical_reason().unwrap_or("request failed").to_string()
}
