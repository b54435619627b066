//! Thin HTTP client for the engine controller

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use tp_core::config::ControllerConfig;
use tp_core::EngineError;

/// HTTP client bound to one controller address
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base: Url,
    secret: Option<String>,
    config: ControllerConfig,
}

impl ControllerClient {
    /// Create a client for the controller described by `config`
    pub fn new(config: &ControllerConfig) -> Result<Self, EngineError> {
        let base = Url::parse(&config.address).map_err(|e| {
            EngineError::Unavailable(format!(
                "invalid controller address '{}': {}",
                config.address, e
            ))
        })?;

        if base.cannot_be_a_base() {
            return Err(EngineError::Unavailable(format!(
                "controller address '{}' cannot be used as a base URL",
                config.address
            )));
        }

        // No client-wide timeout: the log feed is a long-lived response.
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            secret: config.secret.clone(),
            config: config.clone(),
        })
    }

    /// Controller settings this client was built from
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Build the URL for a path made of raw (unencoded) segments
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Start a request with authentication and the default timeout applied
    pub fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.streaming_request(method, segments)
            .timeout(self.config.timeout)
    }

    /// Start a request with no overall timeout
    pub fn streaming_request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.http.request(method, self.url(segments));
        match &self.secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses to engine errors
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, EngineError> {
        let response = request.send().await.map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_default()
            .trim()
            .to_string();

        Err(match status {
            StatusCode::NOT_FOUND => EngineError::NotFound(message),
            _ => EngineError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, EngineError> {
        let response = self.send(self.request(Method::GET, segments)).await?;
        response.json::<T>().await.map_err(map_transport)
    }
}

fn map_transport(e: reqwest::Error) -> EngineError {
    if e.is_decode() {
        EngineError::Decode(e.to_string())
    } else {
        EngineError::Unavailable(e.to_string())
    }
}
