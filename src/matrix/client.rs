//! Matrix client-server API implementation of [`Transport`] over reqwest.

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Result, StickerbookError};

use super::events::parse_event;
use super::media::MxcUri;
use super::{InboundEvent, SyncBatch, Transport};

/// The homeserver part of a Matrix user ID (`@user:server` -> `server`).
pub fn server_name_of_user(user_id: &str) -> String {
    user_id
        .split_once(':')
        .map(|(_, server)| server.to_string())
        .unwrap_or_default()
}

/// Render a markdown reply into HTML for `formatted_body`, so clients show
/// formatted text and inline `mxc://` image previews instead of raw markup.
fn render_html(body: &str) -> String {
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, pulldown_cmark::Parser::new(body));
    html
}

/// `m.text` message content carrying both the plain body and its HTML
/// rendering (`org.matrix.custom.html`).
fn message_content(body: &str) -> Value {
    json!({
        "msgtype": "m.text",
        "body": body,
        "format": "org.matrix.custom.html",
        "formatted_body": render_html(body),
    })
}

pub struct MatrixClient {
    homeserver: String,
    user_id: String,
    access_token: String,
    http: reqwest::Client,
}

impl MatrixClient {
    pub fn new(homeserver: &str, user_id: &str, access_token: &str) -> Self {
        Self {
            homeserver: homeserver.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The server name media must live on to count as already rehosted.
    pub fn server_name(&self) -> String {
        server_name_of_user(&self.user_id)
    }

    /// Verify the access token against `/account/whoami`; fails when the
    /// token resolves to a different user than configured.
    pub async fn whoami(&self) -> Result<String> {
        let url = format!("{}/_matrix/client/v3/account/whoami", self.homeserver);
        let resp: Value = self
            .get(&url, "whoami")
            .await?
            .json()
            .await
            .map_err(|e| StickerbookError::external("whoami", e))?;

        let user_id = resp["user_id"].as_str().unwrap_or_default().to_string();
        if user_id != self.user_id {
            return Err(StickerbookError::external(
                "whoami",
                format!("user ID mismatch: expected {}, got {}", self.user_id, user_id),
            ));
        }
        Ok(user_id)
    }

    async fn get(&self, url: &str, step: &'static str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StickerbookError::external(step, e))?
            .error_for_status()
            .map_err(|e| StickerbookError::external(step, e))
    }

    async fn put_json(&self, url: &str, body: &Value, step: &'static str) -> Result<Value> {
        self.http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| StickerbookError::external(step, e))?
            .error_for_status()
            .map_err(|e| StickerbookError::external(step, e))?
            .json()
            .await
            .map_err(|e| StickerbookError::external(step, e))
    }

    fn txn_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl Transport for MatrixClient {
    async fn download(&self, uri: &MxcUri) -> Result<(Vec<u8>, Option<String>)> {
        let url = format!(
            "{}/_matrix/media/v3/download/{}/{}",
            self.homeserver, uri.server, uri.media_id
        );
        let resp = self.get(&url, "media download").await?;

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let data = resp
            .bytes()
            .await
            .map_err(|e| StickerbookError::external("media download", e))?
            .to_vec();

        if data.is_empty() {
            return Err(StickerbookError::external(
                "media download",
                format!("empty response for {uri}"),
            ));
        }

        Ok((data, mime_type))
    }

    async fn upload(&self, data: &[u8], mime_type: &str) -> Result<MxcUri> {
        let url = format!("{}/_matrix/media/v3/upload", self.homeserver);
        let resp: Value = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| StickerbookError::external("media upload", e))?
            .error_for_status()
            .map_err(|e| StickerbookError::external("media upload", e))?
            .json()
            .await
            .map_err(|e| StickerbookError::external("media upload", e))?;

        let content_uri = resp["content_uri"].as_str().ok_or_else(|| {
            StickerbookError::external("media upload", "response missing content_uri")
        })?;
        MxcUri::parse(content_uri)
    }

    async fn get_event(&self, room_id: &str, event_id: &str) -> Result<Value> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/event/{}",
            self.homeserver, room_id, event_id
        );
        self.get(&url, "event fetch")
            .await?
            .json()
            .await
            .map_err(|e| StickerbookError::external("event fetch", e))
    }

    async fn send_message(&self, room_id: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            room_id,
            Self::txn_id()
        );
        let content = message_content(body);
        let resp = self.put_json(&url, &content, "message send").await?;
        Ok(resp["event_id"].as_str().unwrap_or_default().to_string())
    }

    async fn edit_message(&self, room_id: &str, event_id: &str, new_body: &str) -> Result<String> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            room_id,
            Self::txn_id()
        );
        let mut content = message_content(new_body);
        content["m.new_content"] = message_content(new_body);
        content["m.relates_to"] = json!({"rel_type": "m.replace", "event_id": event_id});
        let resp = self.put_json(&url, &content, "message edit").await?;
        Ok(resp["event_id"].as_str().unwrap_or_default().to_string())
    }

    async fn redact(&self, room_id: &str, event_id: &str) -> Result<()> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/redact/{}/{}",
            self.homeserver,
            room_id,
            event_id,
            Self::txn_id()
        );
        self.put_json(&url, &json!({}), "redaction").await?;
        Ok(())
    }

    async fn send_state(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<()> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/state/{}/{}",
            self.homeserver, room_id, event_type, state_key
        );
        self.put_json(&url, &content, "state event send").await?;
        Ok(())
    }

    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> Result<SyncBatch> {
        let mut url = format!(
            "{}/_matrix/client/v3/sync?timeout={}",
            self.homeserver, timeout_ms
        );
        if let Some(since) = since {
            url.push_str("&since=");
            url.push_str(since);
        }

        let resp: Value = self
            .get(&url, "sync")
            .await?
            .json()
            .await
            .map_err(|e| StickerbookError::external("sync", e))?;

        let next_batch = resp["next_batch"].as_str().unwrap_or_default().to_string();

        let mut events = Vec::new();
        if let Some(rooms) = resp["rooms"]["join"].as_object() {
            for (room_id, room) in rooms {
                if let Some(timeline) = room["timeline"]["events"].as_array() {
                    for raw in timeline {
                        match parse_event(room_id, raw) {
                            InboundEvent::Other => {}
                            event => events.push(event),
                        }
                    }
                }
            }
        }

        Ok(SyncBatch { next_batch, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_of_user() {
        assert_eq!(server_name_of_user("@me:example.org"), "example.org");
        assert_eq!(server_name_of_user("@a:sub.example.org"), "sub.example.org");
        assert_eq!(server_name_of_user("malformed"), "");
    }

    #[test]
    fn test_homeserver_url_is_normalized() {
        let client = MatrixClient::new("https://example.org/", "@me:example.org", "tok");
        assert_eq!(client.homeserver, "https://example.org");
        assert_eq!(client.server_name(), "example.org");
    }

    #[test]
    fn test_render_html_markup_and_images() {
        let html = render_html("- **ID:** `abc`\n\n![a cat](mxc://example.org/media)");
        assert!(html.contains("<strong>ID:</strong>"));
        assert!(html.contains("<code>abc</code>"));
        assert!(html.contains("<img src=\"mxc://example.org/media\""));
        assert!(html.contains("alt=\"a cat\""));
    }

    #[test]
    fn test_message_content_carries_both_bodies() {
        let content = message_content("reply with **bold** text");
        assert_eq!(content["msgtype"], "m.text");
        assert_eq!(content["body"], "reply with **bold** text");
        assert_eq!(content["format"], "org.matrix.custom.html");
        let formatted = content["formatted_body"].as_str().unwrap();
        assert!(formatted.contains("<strong>bold</strong>"));
        assert!(!formatted.contains("**"));
    }
}
