//! `reqwest` implementation of [`ticketing::Backend`].

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use ticketing::backend::paths;
use ticketing::types::LoginRequest;
use ticketing::{ApiError, Backend, Desk, Location, Page, Session, Ticket, TicketPatch, TicketQuery};

use crate::CliError;

#[derive(Debug, Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
}

/// `base` joined with a backend-relative `path`.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Map a transport failure onto the shared error type.
fn transport_error(err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Network("request timed out".to_owned())
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

impl RestBackend {
    /// Client for `base_url`, sending `Bearer <token>` when a token is known.
    ///
    /// # Errors
    ///
    /// Fails on a token that is not a valid header value or when the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, CliError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] for bad credentials, otherwise the transport
    /// or status error.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let response = self
            .http
            .post(join_url(&self.base_url, paths::LOGIN))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&'static str, String)]) -> Result<T, ApiError> {
        let url = join_url(&self.base_url, path);
        tracing::debug!(%url, ?query, "GET");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode(response).await
    }

    async fn patch_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = join_url(&self.base_url, path);
        tracing::debug!(%url, "PATCH");
        let response = self
            .http
            .patch(url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::from_status(status.as_u16()));
    }
    let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

impl Backend for RestBackend {
    async fn list_tickets(&self, query: &TicketQuery) -> Result<Page<Ticket>, ApiError> {
        self.get_json(paths::TICKETS, &query.pairs()).await
    }

    async fn update_ticket(&self, id: &str, patch: &TicketPatch) -> Result<Ticket, ApiError> {
        self.patch_json(&paths::ticket(id), patch).await
    }

    async fn list_locations(&self) -> Result<Page<Location>, ApiError> {
        self.get_json(paths::LOCATIONS, &paths::location_list_query()).await
    }

    async fn get_location(&self, id: &str) -> Result<Location, ApiError> {
        self.get_json(&paths::location(id), &[]).await
    }

    async fn list_desks(&self, location_id: &str) -> Result<Page<Desk>, ApiError> {
        self.get_json(paths::DESKS, &paths::desk_list_query(location_id)).await
    }

    async fn get_desk(&self, id: &str) -> Result<Desk, ApiError> {
        self.get_json(&paths::desk(id), &[]).await
    }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
