use crate::utils::error::{Result, SimError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

/// REST client for the loopback services.
///
/// One `reqwest::Client` is kept for the lifetime of the value so requests
/// reuse the same connections.
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    verbose: bool,
    dump_headers: bool,
    client: Client,
}

impl RestClient {
    pub fn new(host: &str, port: u16, verbose: bool, dump_headers: bool) -> Self {
        Self::with_base_url(format!("http://{}:{}", host, port), verbose, dump_headers)
    }

    pub fn with_base_url(base_url: impl Into<String>, verbose: bool, dump_headers: bool) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            verbose,
            dump_headers,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, uri: &str) -> String {
        if uri.starts_with('/') {
            format!("{}{}", self.base_url, uri)
        } else {
            format!("{}/{}", self.base_url, uri)
        }
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.send::<()>(Method::GET, uri, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, uri: &str, body: &B) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, uri: &str, body: &B) -> Result<(StatusCode, Value)> {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, uri: &str, body: &B) -> Result<(StatusCode, Value)> {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.send::<()>(Method::DELETE, uri, None).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        uri: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, Value)> {
        let url = self.url(uri);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            let json = serde_json::to_value(body)?;
            if self.verbose {
                tracing::info!("HTTP {} {} {} ...", method, url, json);
            }
            request = request.json(&json);
        } else if self.verbose {
            tracing::info!("HTTP {} {} ...", method, url);
        }

        let response = request.send().await?;
        self.decode(&method, response).await
    }

    async fn decode(&self, method: &Method, response: Response) -> Result<(StatusCode, Value)> {
        let status = response.status();
        if self.dump_headers {
            tracing::info!("HTTP Response Headers:");
            for (name, value) in response.headers() {
                tracing::info!("    {}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
        }

        let text = response.text().await?;
        // 非 JSON 的回應以字串保留
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if self.verbose {
            tracing::info!("HTTP {} => {}, {}", method, status.as_u16(), value);
        }
        Ok((status, value))
    }
}

/// Waits up to `timeout` until a GET on `url` answers with a 2xx status.
pub async fn wait_until_reachable(url: &str, timeout: Duration) -> Result<Value> {
    let client = Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;
    let start = Instant::now();
    tracing::debug!("wait_until_reachable({}, {:?})", url, timeout);

    while start.elapsed() < timeout {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let value = resp.json::<Value>().await.unwrap_or(Value::Null);
                tracing::debug!(
                    "wait_until_reachable({}) => true after {:.2}s",
                    url,
                    start.elapsed().as_secs_f64()
                );
                return Ok(value);
            }
            Ok(resp) => tracing::trace!("{} answered {}", url, resp.status()),
            Err(e) => tracing::trace!("{} not yet reachable: {}", url, e),
        }
    }

    Err(SimError::Unreachable {
        url: url.to_string(),
        timeout_secs: timeout.as_secs(),
    })
}
