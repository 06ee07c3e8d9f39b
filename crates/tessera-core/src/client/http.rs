//! reqwest implementation of the chat and task endpoints

use crate::chat::{ChatBackend, ChatRequest};
use crate::config::ApiConfig;
use crate::error::{TesseraError, TesseraResult};
use crate::stream::ByteStream;
use crate::tasks::{ActivityLogEntry, Task, TaskBackend};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, instrument};

/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for the dashboard backend
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> TesseraResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TesseraError::config_with_context(
                    format!("failed to build HTTP client: {}", e),
                    "creating the backend client",
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> TesseraResult<Response> {
        let response = self.authorize(request).send().await?;
        ensure_success(response).await
    }
}

/// Turn a non-2xx response into [`TesseraError::Http`]
async fn ensure_success(response: Response) -> TesseraResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let mut message = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));
    let body = body.trim();
    if !body.is_empty() {
        let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
        message.push_str(": ");
        message.push_str(&snippet);
    }
    Err(TesseraError::http_with_url(status.as_u16(), message.trim_end(), url))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    #[instrument(skip(self, request), fields(history = request.history.len()))]
    async fn open_stream(&self, request: &ChatRequest) -> TesseraResult<ByteStream> {
        let response = self
            .send(
                self.client
                    .post(self.url("chat"))
                    .header("Accept", "text/event-stream")
                    .json(request),
            )
            .await?;
        debug!(status = response.status().as_u16(), "chat stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TesseraError::stream(e.to_string())));
        Ok(Box::pin(body))
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    async fn list_tasks(&self) -> TesseraResult<Vec<Task>> {
        let response = self.send(self.client.get(self.url("tasks"))).await?;
        Ok(response.json().await?)
    }

    async fn task_logs(&self, task_id: &str) -> TesseraResult<Vec<ActivityLogEntry>> {
        let response = self
            .send(self.client.get(self.url(&format!("tasks/{}/logs", task_id))))
            .await?;
        Ok(response.json().await?)
    }

    async fn cancel_task(&self, task_id: &str) -> TesseraResult<()> {
        self.send(self.client.post(self.url(&format!("tasks/{}/cancel", task_id))))
            .await?;
        Ok(())
    }
}
