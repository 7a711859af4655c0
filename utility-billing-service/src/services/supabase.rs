//! Supabase (PostgREST) implementation of the row store.

use super::gateway::{Filter, Record, StoreGateway};
use super::metrics::STORE_CALL_DURATION;
use crate::config::SupabaseConfig;
use crate::error::{BillingError, BillingResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use service_core::observability::inject_trace_context;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::time::Duration;
use tracing::instrument;

const BODY_SNIPPET_LEN: usize = 200;

pub struct SupabaseGateway {
    client: Client,
    rest_url: String,
    key: Secret<String>,
    retry: RetryConfig,
}

impl SupabaseGateway {
    pub fn new(config: &SupabaseConfig) -> BillingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BillingError::gateway("client", e.to_string()))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            key: config.service_role_key.clone(),
            retry: RetryConfig::with_max_retries(config.retry_attempts),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn headers(&self) -> BillingResult<HeaderMap> {
        let mut headers = auth_headers(&self.key)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        inject_trace_context(&mut headers);
        Ok(headers)
    }

    async fn fetch(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        let _timer = STORE_CALL_DURATION.with_label_values(&["get"]).start_timer();

        let mut query = vec![("select".to_string(), "*".to_string())];
        query.extend(filter.to_query_pairs());

        let response = self
            .client
            .get(format!("{}/{}", self.rest_url, collection))
            .headers(self.headers()?)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error("get", e))?;

        decode_rows("get", collection, response).await
    }
}

#[async_trait]
impl StoreGateway for SupabaseGateway {
    #[instrument(skip(self, filter), fields(filter = %filter))]
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        retry_with_backoff(&self.retry, "store.get", || self.fetch(collection, filter)).await
    }

    #[instrument(skip(self, record))]
    async fn insert(&self, collection: &str, record: Record) -> BillingResult<Record> {
        let _timer = STORE_CALL_DURATION
            .with_label_values(&["insert"])
            .start_timer();

        let response = self
            .client
            .post(format!("{}/{}", self.rest_url, collection))
            .headers(self.headers()?)
            .json(&record)
            .send()
            .await
            .map_err(|e| transport_error("insert", e))?;

        decode_rows("insert", collection, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BillingError::gateway("insert", format!("malformed {} insert: no row returned", collection))
            })
    }

    #[instrument(skip(self, filter, partial), fields(filter = %filter))]
    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>> {
        let _timer = STORE_CALL_DURATION
            .with_label_values(&["update"])
            .start_timer();

        let response = self
            .client
            .patch(format!("{}/{}", self.rest_url, collection))
            .headers(self.headers()?)
            .query(&filter.to_query_pairs())
            .json(&partial)
            .send()
            .await
            .map_err(|e| transport_error("update", e))?;

        decode_rows("update", collection, response).await
    }
}

/// `apikey` plus bearer headers, both marked sensitive so they never show up
/// in debug output.
pub(crate) fn auth_headers(key: &Secret<String>) -> BillingResult<HeaderMap> {
    let invalid = || BillingError::gateway("headers", "service role key is not a valid header value");

    let mut apikey = HeaderValue::from_str(key.expose_secret()).map_err(|_| invalid())?;
    apikey.set_sensitive(true);
    let mut bearer =
        HeaderValue::from_str(&format!("Bearer {}", key.expose_secret())).map_err(|_| invalid())?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert("apikey", apikey);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

pub(crate) fn transport_error(operation: &str, e: reqwest::Error) -> BillingError {
    let transient = e.is_timeout() || e.is_connect() || e.is_request();
    let message = e.without_url().to_string();
    if transient {
        BillingError::gateway_transient(operation, message)
    } else {
        BillingError::gateway(operation, message)
    }
}

/// Maps a non-success response to a gateway error. 5xx and 429 are worth
/// retrying for reads.
pub(crate) async fn status_error(operation: &str, response: Response) -> BillingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), snippet);

    if status.is_server_error() || status.as_u16() == 429 {
        BillingError::gateway_transient(operation, message)
    } else {
        BillingError::gateway(operation, message)
    }
}

async fn decode_rows(
    operation: &str,
    collection: &str,
    response: Response,
) -> BillingResult<Vec<Record>> {
    if !response.status().is_success() {
        return Err(status_error(operation, response).await);
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| BillingError::gateway(operation, format!("malformed {} response: {}", collection, e)))?;

    match body {
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| match row {
                Value::Object(record) => Ok(record),
                _ => Err(BillingError::gateway(
                    operation,
                    format!("malformed {} response: row is not an object", collection),
                )),
            })
            .collect(),
        Value::Object(record) => Ok(vec![record]),
        _ => Err(BillingError::gateway(
            operation,
            format!("malformed {} response: expected rows", collection),
        )),
    }
}
