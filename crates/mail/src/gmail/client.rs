//! Gmail API HTTP client
//!
//! Implements [`GmailApi`] over the Gmail REST API. Uses synchronous HTTP
//! (ureq) to be executor-agnostic. Non-2xx responses are read rather than
//! raised by ureq so the provider's error code reaches classification.

use std::time::Duration;

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use ureq::http::Response;
use ureq::{Agent, Body};
use url::Url;

use super::api::{
    ApiErrorResponse, DraftBody, DraftRef, GmailDraft, GmailLabel, GmailThread, LabelBody,
    ListDraftsResponse, ListLabelsResponse, ListSendAsResponse, ListThreadsResponse, MessageBody,
    MessageRef, ModifyRequest, OAuthErrorResponse, ProfileResponse, RawMessage, SendAs,
};
use super::{GmailApi, GmailAuth, ThreadQuery};
use crate::config::GmailCredentials;
use crate::error::{ProviderError, ProviderResult};

/// Gmail API client bound to one authenticated account
pub struct GmailClient {
    auth: GmailAuth,
    agent: Agent,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1/users/me";

    /// Per-request timeout
    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a client for the account owning `refresh_token`
    pub fn new(credentials: GmailCredentials, refresh_token: impl Into<String>) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Self::TIMEOUT))
            .build()
            .into();
        let auth = GmailAuth::new(credentials, refresh_token, agent.clone());
        Self { auth, agent }
    }

    fn url(path: &str) -> String {
        format!("{}/{}", Self::BASE_URL, path)
    }

    fn bearer(&self) -> ProviderResult<String> {
        Ok(format!("Bearer {}", self.auth.get_access_token()?))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> ProviderResult<T> {
        debug!("GET {}", url);
        let response = self
            .agent
            .get(url)
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport_error)?;
        read_json(response)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> ProviderResult<T> {
        debug!("POST {}", url);
        let response = self
            .agent
            .post(url)
            .header("Authorization", &self.bearer()?)
            .send_json(body)
            .map_err(transport_error)?;
        read_json(response)
    }

    fn put_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> ProviderResult<T> {
        debug!("PUT {}", url);
        let response = self
            .agent
            .put(url)
            .header("Authorization", &self.bearer()?)
            .send_json(body)
            .map_err(transport_error)?;
        read_json(response)
    }

    fn delete(&self, url: &str) -> ProviderResult<()> {
        debug!("DELETE {}", url);
        let response = self
            .agent
            .delete(url)
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }

    /// Build a listing URL with label, query and paging parameters
    fn listing_url(path: &str, query: &ThreadQuery) -> ProviderResult<String> {
        let mut url = Url::parse(&Self::url(path))
            .map_err(|e| ProviderError::malformed(format!("Invalid URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("maxResults", &query.max_results.clamp(1, 500).to_string());
            for label in &query.label_ids {
                pairs.append_pair("labelIds", label);
            }
            if let Some(q) = query.q.as_deref().filter(|q| !q.is_empty()) {
                pairs.append_pair("q", q);
            }
            if let Some(token) = &query.page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        Ok(url.into())
    }
}

impl GmailApi for GmailClient {
    fn get_profile(&self) -> ProviderResult<ProfileResponse> {
        self.get_json(&Self::url("profile"))
    }

    fn list_threads(&self, query: &ThreadQuery) -> ProviderResult<ListThreadsResponse> {
        self.get_json(&Self::listing_url("threads", query)?)
    }

    fn get_thread(&self, id: &str) -> ProviderResult<GmailThread> {
        self.get_json(&Self::url(&format!(
            "threads/{}?format=full",
            urlencoding::encode(id)
        )))
    }

    fn modify_thread(&self, id: &str, add: &[String], remove: &[String]) -> ProviderResult<()> {
        let body = ModifyRequest {
            add_label_ids: add.to_vec(),
            remove_label_ids: remove.to_vec(),
        };
        let _: serde_json::Value = self.post_json(
            &Self::url(&format!("threads/{}/modify", urlencoding::encode(id))),
            &body,
        )?;
        Ok(())
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> ProviderResult<MessageBody> {
        self.get_json(&Self::url(&format!(
            "messages/{}/attachments/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        )))
    }

    fn send_message(&self, raw: &str, thread_id: Option<&str>) -> ProviderResult<MessageRef> {
        let body = RawMessage {
            raw: raw.to_string(),
            thread_id: thread_id.map(str::to_string),
        };
        self.post_json(&Self::url("messages/send"), &body)
    }

    fn create_draft(&self, raw: &str, thread_id: Option<&str>) -> ProviderResult<DraftRef> {
        let body = DraftBody {
            id: None,
            message: RawMessage {
                raw: raw.to_string(),
                thread_id: thread_id.map(str::to_string),
            },
        };
        self.post_json(&Self::url("drafts"), &body)
    }

    fn update_draft(&self, id: &str, raw: &str, thread_id: Option<&str>) -> ProviderResult<DraftRef> {
        let body = DraftBody {
            id: Some(id.to_string()),
            message: RawMessage {
                raw: raw.to_string(),
                thread_id: thread_id.map(str::to_string),
            },
        };
        self.put_json(&Self::url(&format!("drafts/{}", urlencoding::encode(id))), &body)
    }

    fn send_draft(&self, id: &str, raw: &str, thread_id: Option<&str>) -> ProviderResult<MessageRef> {
        let body = DraftBody {
            id: Some(id.to_string()),
            message: RawMessage {
                raw: raw.to_string(),
                thread_id: thread_id.map(str::to_string),
            },
        };
        self.post_json(&Self::url("drafts/send"), &body)
    }

    fn list_drafts(&self, query: &ThreadQuery) -> ProviderResult<ListDraftsResponse> {
        self.get_json(&Self::listing_url("drafts", query)?)
    }

    fn get_draft(&self, id: &str) -> ProviderResult<GmailDraft> {
        self.get_json(&Self::url(&format!(
            "drafts/{}?format=full",
            urlencoding::encode(id)
        )))
    }

    fn delete_draft(&self, id: &str) -> ProviderResult<()> {
        self.delete(&Self::url(&format!("drafts/{}", urlencoding::encode(id))))
    }

    fn list_labels(&self) -> ProviderResult<Vec<GmailLabel>> {
        let response: ListLabelsResponse = self.get_json(&Self::url("labels"))?;
        Ok(response.labels.unwrap_or_default())
    }

    fn get_label(&self, id: &str) -> ProviderResult<GmailLabel> {
        self.get_json(&Self::url(&format!("labels/{}", urlencoding::encode(id))))
    }

    fn create_label(&self, body: &LabelBody) -> ProviderResult<GmailLabel> {
        self.post_json(&Self::url("labels"), body)
    }

    fn update_label(&self, id: &str, body: &LabelBody) -> ProviderResult<GmailLabel> {
        self.put_json(&Self::url(&format!("labels/{}", urlencoding::encode(id))), body)
    }

    fn delete_label(&self, id: &str) -> ProviderResult<()> {
        self.delete(&Self::url(&format!("labels/{}", urlencoding::encode(id))))
    }

    fn list_send_as(&self) -> ProviderResult<Vec<SendAs>> {
        let response: ListSendAsResponse = self.get_json(&Self::url("settings/sendAs"))?;
        Ok(response.send_as.unwrap_or_default())
    }

    fn revoke_token(&self, token: &str) -> ProviderResult<bool> {
        self.auth.revoke(token)
    }
}

/// Map a ureq failure (no usable response) to a transport error
pub(super) fn transport_error(err: ureq::Error) -> ProviderError {
    ProviderError::transport(format!("Request failed: {}", err))
}

fn check_status(mut response: Response<Body>) -> ProviderResult<Response<Body>> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(provider_error_from_body(status, &body))
}

fn read_json<T: DeserializeOwned>(response: Response<Body>) -> ProviderResult<T> {
    let mut response = check_status(response)?;
    response
        .body_mut()
        .read_json()
        .map_err(|e| ProviderError::malformed(format!("Failed to parse response: {}", e)))
}

/// Parse either Gmail's or the OAuth endpoint's error body
pub(super) fn provider_error_from_body(status: u16, body: &str) -> ProviderError {
    if let Ok(api) = serde_json::from_str::<ApiErrorResponse>(body) {
        let reason = api
            .error
            .errors
            .as_ref()
            .and_then(|errors| errors.iter().find_map(|e| e.reason.clone()));
        let code = reason.or(api.error.status);
        let message = api
            .error
            .message
            .unwrap_or_else(|| format!("HTTP {}", status));
        return ProviderError::http(status, code, message);
    }

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorResponse>(body) {
        let message = oauth
            .error_description
            .unwrap_or_else(|| oauth.error.clone());
        return ProviderError::http(status, Some(oauth.error), message);
    }

    let message = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body.trim().to_string()
    };
    ProviderError::http(status, None, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gmail_error_body() {
        let body = r#"{"error":{"code":429,"message":"Too many requests","status":"RESOURCE_EXHAUSTED","errors":[{"reason":"rateLimitExceeded"}]}}"#;
        let err = provider_error_from_body(429, body);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.code.as_deref(), Some("rateLimitExceeded"));
        assert_eq!(err.message, "Too many requests");
    }

    #[test]
    fn test_parse_oauth_error_body() {
        let body = r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#;
        let err = provider_error_from_body(400, body);
        assert_eq!(err.code.as_deref(), Some("invalid_grant"));
        assert_eq!(err.message, "Token has been expired or revoked.");
    }

    #[test]
    fn test_parse_unstructured_error_body() {
        let err = provider_error_from_body(502, "");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "HTTP 502");
    }

    #[test]
    fn test_listing_url_encodes_query() {
        let query = ThreadQuery {
            label_ids: vec!["INBOX".into()],
            q: Some("from:alice has:attachment".into()),
            max_results: 20,
            page_token: Some("abc".into()),
        };
        let url = GmailClient::listing_url("threads", &query).unwrap();
        assert!(url.starts_with("https://gmail.googleapis.com/gmail/v1/users/me/threads?"));
        assert!(url.contains("maxResults=20"));
        assert!(url.contains("labelIds=INBOX"));
        assert!(url.contains("q=from%3Aalice+has%3Aattachment"));
        assert!(url.contains("pageToken=abc"));
    }
}
