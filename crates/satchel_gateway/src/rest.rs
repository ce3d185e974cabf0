//! REST transport for the gateway contract.
//!
//! The actual HTTP client is abstracted via a trait so any HTTP library
//! (reqwest, ureq, hyper, ...) can drive the same request mapping.

use crate::error::{GatewayError, GatewayResult};
use crate::wire::WireDocument;
use crate::Gateway;

/// HTTP method subset used by the document CRUD mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Fetch a resource.
    Get,
    /// Create-or-update a resource.
    Put,
    /// Delete a resource.
    Delete,
}

/// A request handed to the [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body, when the method carries one.
    pub body: Option<Vec<u8>>,
}

/// A response returned by the [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Errors returned
/// from [`HttpClient::send`] are treated as transient (the request never
/// reached the remote store); remote-side failures travel as status
/// codes.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// A gateway speaking document CRUD over REST.
///
/// Route mapping:
/// - `GET    {base}/collections/{name}/documents`
/// - `GET    {base}/collections/{name}/documents/{id}`
/// - `PUT    {base}/collections/{name}/documents`
/// - `DELETE {base}/collections/{name}/documents/{id}`
/// - `DELETE {base}/collections/{name}/documents`
pub struct RestGateway<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> RestGateway<C> {
    /// Creates a gateway rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{collection}/documents", self.base_url)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{id}", self.collection_url(collection))
    }

    fn send(&self, collection: &str, request: HttpRequest) -> GatewayResult<HttpResponse> {
        if !self.client.is_healthy() {
            return Err(GatewayError::unreachable("client reports unhealthy"));
        }

        let response = self
            .client
            .send(request)
            .map_err(GatewayError::unreachable)?;

        match response.status {
            200..=299 => Ok(response),
            404 => Err(GatewayError::NotFound {
                collection: collection.to_string(),
                id: body_text(&response),
            }),
            400..=499 => Err(GatewayError::rejected(format!(
                "status {}: {}",
                response.status,
                body_text(&response)
            ))),
            status => Err(GatewayError::unreachable(format!(
                "server error, status {status}"
            ))),
        }
    }

    fn decode_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> GatewayResult<T> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Protocol(format!("invalid response body: {e}")))
    }
}

fn body_text(response: &HttpResponse) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}

impl<C: HttpClient> Gateway for RestGateway<C> {
    fn get_collection(&self, collection: &str) -> GatewayResult<Vec<WireDocument>> {
        let response = self.send(
            collection,
            HttpRequest {
                method: HttpMethod::Get,
                url: self.collection_url(collection),
                body: None,
            },
        )?;
        Self::decode_json(&response.body)
    }

    fn get_document(&self, collection: &str, id: &str) -> GatewayResult<WireDocument> {
        let response = self.send(
            collection,
            HttpRequest {
                method: HttpMethod::Get,
                url: self.document_url(collection, id),
                body: None,
            },
        )?;
        Self::decode_json(&response.body)
    }

    fn save_document(
        &self,
        collection: &str,
        document: &WireDocument,
    ) -> GatewayResult<WireDocument> {
        let body = serde_json::to_vec(document)
            .map_err(|e| GatewayError::Protocol(format!("failed to encode document: {e}")))?;
        let response = self.send(
            collection,
            HttpRequest {
                method: HttpMethod::Put,
                url: self.collection_url(collection),
                body: Some(body),
            },
        )?;
        Self::decode_json(&response.body)
    }

    fn delete_document(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.send(
            collection,
            HttpRequest {
                method: HttpMethod::Delete,
                url: self.document_url(collection, id),
                body: None,
            },
        )?;
        Ok(())
    }

    fn clear_collection(&self, collection: &str) -> GatewayResult<()> {
        self.send(
            collection,
            HttpRequest {
                method: HttpMethod::Delete,
                url: self.collection_url(collection),
                body: None,
            },
        )?;
        Ok(())
    }
}
