//! Thin JSON-over-HTTP helper shared by the provider clients.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ProviderError, ProviderResult};

/// Base URL plus optional bearer token for one provider endpoint.
#[derive(Clone)]
pub struct JsonApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl JsonApi {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`] so all providers share one
    /// connection pool.
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// `POST {base}/{path}` with a JSON body, decoding a JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(map_request_error)?;
        Self::parse_response(response).await
    }

    /// `POST {base}/{path}` with a JSON body, returning raw response bytes.
    pub async fn post_for_bytes<B>(&self, path: &str, body: &B) -> ProviderResult<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(map_request_error)?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await.map_err(map_request_error)?.to_vec())
    }

    /// `GET {base}/{path}`, decoding a JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let response = self
            .authorize(self.client.get(self.url(path)))
            .send()
            .await
            .map_err(map_request_error)?;
        Self::parse_response(response).await
    }

    /// `GET` an absolute URL, returning raw bytes.
    pub async fn get_bytes(&self, url: &str) -> ProviderResult<Vec<u8>> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(map_request_error)?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await.map_err(map_request_error)?.to_vec())
    }

    // ---- private helpers ----

    /// Return the response unchanged on 2xx, or a classified
    /// [`ProviderError`] carrying the body text.
    async fn ensure_success(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(map_request_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn map_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Request(err)
    }
}
