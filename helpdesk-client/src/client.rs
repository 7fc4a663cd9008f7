//! HTTP client for the helpdesk REST API

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{ClientError, Result};
use crate::store::HelpdeskStore;
use crate::types::*;

/// HTTP client bound to a single helpdesk account
///
/// # Example
///
/// ```rust,no_run
/// use helpdesk_client::{AccountConfig, HelpdeskClient, HelpdeskStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HelpdeskClient::new(AccountConfig::new("acme", "admin@acme.test", "secret"))?;
///
/// for form in client.list_ticket_forms().await? {
///     println!("{} {}", form.id, form.name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct HelpdeskClient {
    config: AccountConfig,
    base_url: String,
    client: Client,
}

impl HelpdeskClient {
    /// Create a new client for one account
    pub fn new(config: AccountConfig) -> Result<Self> {
        if config.subdomain.is_empty() && config.base_url.is_none() {
            return Err(ClientError::InvalidConfig(
                "either a subdomain or a base URL is required".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url();
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// API root this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ==================== Helper Methods ====================

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(self.config.auth_user(), Some(&self.config.token))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!(account = %self.account(), %url, "GET");
        let response = self.request(Method::GET, url).send().await?;
        self.handle_response(&Method::GET, url, response).await
    }

    /// GET a single resource wrapped in `{ "<key>": ... }`
    async fn get_one<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<T> {
        let mut body = self.get_json(&self.url(path)).await?;
        take_envelope(&mut body, key)
    }

    /// GET every page of a collection, following `next_page`
    async fn get_collection<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path));

        while let Some(url) = next.take() {
            let mut page = self.get_json(&url).await?;
            let batch: Vec<T> = take_envelope(&mut page, key)?;
            items.extend(batch);

            next = page
                .get("next_page")
                .and_then(Value::as_str)
                .filter(|candidate| *candidate != url)
                .map(String::from);
        }

        Ok(items)
    }

    /// POST `{ "<key>": body }` and unwrap the same key from the response
    async fn create<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        let mut envelope = serde_json::Map::new();
        envelope.insert(key.to_string(), serde_json::to_value(body)?);
        let payload = Value::Object(envelope);
        debug!(account = %self.account(), %url, "POST");

        let response = self
            .request(Method::POST, &url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        let mut body = match self.handle_response(&Method::POST, &url, response).await {
            Ok(body) => body,
            Err(e) => {
                error!(
                    account = %self.account(),
                    %url,
                    request = %payload,
                    "Request body that caused the error"
                );
                return Err(e);
            }
        };
        take_envelope(&mut body, key)
    }

    async fn handle_response(
        &self,
        method: &Method,
        url: &str,
        response: reqwest::Response,
    ) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let retry_after_secs = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        error!(
            account = %self.account(),
            %method,
            %url,
            status = status.as_u16(),
            response = %body,
            "Helpdesk API request failed"
        );

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(url.to_string()),
            StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited { retry_after_secs },
            _ => ClientError::Server {
                status: status.as_u16(),
                message: body,
            },
        })
    }
}

/// Take `key` out of a single-key envelope and deserialize it
fn take_envelope<T: DeserializeOwned>(body: &mut Value, key: &str) -> Result<T> {
    let inner = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing `{}` in response", key)))?;
    Ok(serde_json::from_value(inner)?)
}

#[async_trait]
impl HelpdeskStore for HelpdeskClient {
    fn account(&self) -> &str {
        if self.config.subdomain.is_empty() {
            &self.base_url
        } else {
            &self.config.subdomain
        }
    }

    async fn get_ticket_form(&self, form_id: u64) -> Result<TicketForm> {
        self.get_one(&format!("ticket_forms/{}", form_id), "ticket_form")
            .await
    }

    async fn list_ticket_forms(&self) -> Result<Vec<TicketForm>> {
        self.get_collection("ticket_forms", "ticket_forms").await
    }

    async fn list_ticket_fields(&self) -> Result<Vec<TicketField>> {
        self.get_collection("ticket_fields", "ticket_fields").await
    }

    async fn list_custom_objects(&self) -> Result<Vec<CustomObject>> {
        self.get_collection("custom_objects", "custom_objects").await
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        self.get_collection("brands", "brands").await
    }

    async fn create_ticket_form(&self, form: &NewTicketForm) -> Result<TicketForm> {
        self.create("ticket_forms", "ticket_form", form).await
    }

    async fn create_ticket_field(&self, field: &NewTicketField) -> Result<TicketField> {
        self.create("ticket_fields", "ticket_field", field).await
    }

    async fn create_custom_object(&self, object: &NewCustomObject) -> Result<CustomObject> {
        self.create("custom_objects", "custom_object", object).await
    }
}
