use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Listing, ListingId, UserId, UserRecord},
    protocol::{Acknowledgement, ListingQuery, ServerReply, UpdateUserRequest},
};
use tracing::{debug, warn};

use crate::{config::ClientSettings, error::ClientError};

/// The REST backend as seen by the client.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn update_user(
        &self,
        user_id: &UserId,
        request: &UpdateUserRequest,
    ) -> Result<UserRecord, ClientError>;
    async fn delete_user(&self, user_id: &UserId) -> Result<Acknowledgement, ClientError>;
    async fn sign_out(&self) -> Result<Acknowledgement, ClientError>;
    async fn user_listings(&self, user_id: &UserId) -> Result<Vec<Listing>, ClientError>;
    async fn delete_listing(&self, listing_id: &ListingId) -> Result<Acknowledgement, ClientError>;
    async fn listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, ClientError>;
}

pub struct HttpBackendApi {
    http: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl HttpBackendApi {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
        }
    }

    pub fn from_settings(http: Client, settings: &ClientSettings) -> Self {
        let mut api = Self::new(http, settings.api_base_url.clone());
        api.session_cookie = settings.session_cookie.clone();
        api
    }

    pub fn with_session_cookie(mut self, token: impl Into<String>) -> Self {
        self.session_cookie = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(token) => request.header(header::COOKIE, format!("access_token={token}")),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self.authorize(request).send().await.map_err(|err| {
            warn!(operation, error = %err, "request failed before a response arrived");
            ClientError::from(err)
        })?;
        read_reply(operation, response).await
    }
}

/// Backend failures arrive as `{ success: false, message }` under any status code,
/// so the body decides the outcome rather than the status.
async fn read_reply<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;
    match ServerReply::<T>::from_slice(&body)?.into_result() {
        Ok(payload) => {
            debug!(operation, status = status.as_u16(), "request accepted");
            Ok(payload)
        }
        Err(rejection) => {
            warn!(
                operation,
                status = status.as_u16(),
                message = %rejection.message,
                "request rejected by server"
            );
            Err(rejection.into())
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn update_user(
        &self,
        user_id: &UserId,
        request: &UpdateUserRequest,
    ) -> Result<UserRecord, ClientError> {
        let url = self.endpoint(&format!("/api/user/update/{user_id}"));
        self.send("update_user", self.http.post(url).json(request)).await
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<Acknowledgement, ClientError> {
        let url = self.endpoint(&format!("/api/user/delete/{user_id}"));
        self.send("delete_user", self.http.delete(url)).await
    }

    async fn sign_out(&self) -> Result<Acknowledgement, ClientError> {
        let url = self.endpoint("/api/auth/signout");
        self.send("sign_out", self.http.get(url)).await
    }

    async fn user_listings(&self, user_id: &UserId) -> Result<Vec<Listing>, ClientError> {
        let url = self.endpoint(&format!("/api/user/listings/{user_id}"));
        self.send("user_listings", self.http.get(url)).await
    }

    async fn delete_listing(
        &self,
        listing_id: &ListingId,
    ) -> Result<Acknowledgement, ClientError> {
        let url = self.endpoint(&format!("/api/listing/delete/{listing_id}"));
        self.send("delete_listing", self.http.delete(url)).await
    }

    async fn listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, ClientError> {
        let url = self.endpoint("/api/listing/get");
        self.send("listings", self.http.get(url).query(query)).await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
