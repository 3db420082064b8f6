//! HTTP binding of [`RemoteStore`] for a PostgREST-style row API.
//!
//! ```text
//! select  GET    {base}/rest/v1/{table}?select=*&{col}=eq.{v}&order={col}.asc
//! insert  POST   {base}/rest/v1/{table}              Prefer: return=representation
//! update  PATCH  {base}/rest/v1/{table}?{col}=eq.{v} Prefer: return=representation
//! delete  DELETE {base}/rest/v1/{table}?{col}=eq.{v} Prefer: return=representation
//! ```
//!
//! Timeouts come from the default transport; there is no per-call override.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::SyncError;
use crate::metrics::LatencyTimer;
use super::traits::{Filter, Order, RemoteStore, Row};

#[derive(Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl RestRemoteStore {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| SyncError::UnsupportedOperation(format!("invalid api key header: {e}")))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| SyncError::UnsupportedOperation(format!("invalid api key header: {e}")))?;
            headers.insert("apikey", value);
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn request(&self, method: Method, table: &str, filters: &[Filter]) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let query: Vec<(String, String)> = filters
            .iter()
            .map(|f| (f.column.clone(), filter_expr(&f.value)))
            .collect();
        self.client
            .request(method, url)
            .headers(self.headers.clone())
            .query(&query)
    }

    async fn rows(response: Response) -> Result<Vec<Row>, SyncError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::ServerError { status: status.as_u16(), body });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body)? {
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Object(row) => Ok(row),
                    other => Err(SyncError::DecodeError(format!("expected row object, got {other}"))),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            other => Err(SyncError::DecodeError(format!("expected rows, got {other}"))),
        }
    }
}

/// `eq.` operand in PostgREST syntax. Null compares with `is.null`.
fn filter_expr(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

fn order_expr(order: &Order) -> String {
    format!("{}.{}", order.column, if order.ascending { "asc" } else { "desc" })
}

fn observe<T>(operation: &'static str, result: Result<T, SyncError>) -> Result<T, SyncError> {
    let status = match &result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    crate::metrics::record_operation("remote", operation, status);
    result
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>, SyncError> {
        let mut request = self.request(Method::GET, table, filters).query(&[("select", "*")]);
        if let Some(order) = order {
            request = request.query(&[("order", order_expr(order))]);
        }
        debug!(table, filters = filters.len(), "remote select");
        let _timer = LatencyTimer::new("remote", "select");
        let result = async { Self::rows(request.send().await?).await }.await;
        observe("select", result)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        let _timer = LatencyTimer::new("remote", "insert");
        let result = async {
            let response = self
                .request(Method::POST, table, &[])
                .header("Prefer", "return=representation")
                .json(&row)
                .send()
                .await?;
            Self::rows(response)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| SyncError::DecodeError(format!("{table}: insert returned no row")))
        }
        .await;
        observe("insert", result)
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> Result<u64, SyncError> {
        let _timer = LatencyTimer::new("remote", "update");
        let result = async {
            let response = self
                .request(Method::PATCH, table, filters)
                .header("Prefer", "return=representation")
                .json(&patch)
                .send()
                .await?;
            Ok::<_, SyncError>(Self::rows(response).await?.len() as u64)
        }
        .await;
        observe("update", result)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, SyncError> {
        if filters.is_empty() {
            return Err(SyncError::UnsupportedOperation(format!("unfiltered delete on {table}")));
        }
        let _timer = LatencyTimer::new("remote", "delete");
        let result = async {
            let response = self
                .request(Method::DELETE, table, filters)
                .header("Prefer", "return=representation")
                .send()
                .await?;
            Ok::<_, SyncError>(Self::rows(response).await?.len() as u64)
        }
        .await;
        observe("delete", result)
    }
}
