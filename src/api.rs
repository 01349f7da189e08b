// Thin wrapper over the bby API: fixed base URL, JSON by default, binary
// override for gallery saves. Non-2xx responses become errors carrying the
// server's own message when it sent one.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

use crate::canvas::{PaintEvent, PixelWrite};
use crate::colour::Rgb;
use crate::state::StateSnapshot;

pub const API_BASE: &str = "https://bbyapi.childofanandroid.co.uk/api";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint}: {message}")]
    Server { endpoint: String, message: String },
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub colour: Option<MessageColour>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MessageColour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl MessageColour {
    pub fn to_rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaintCanvas {
    pub width: u32,
    pub height: u32,
    pub rgba_b64: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ActivityPointer {
    pub snap_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BbyFact {
    pub value: String,
    #[serde(default)]
    pub author: String,
}

pub type BbyBook = HashMap<String, BbyFact>;

pub struct Api {
    http: reqwest::Client,
    base: String,
}

impl Api {
    pub fn new() -> Self {
        Self::with_base(API_BASE)
    }

    pub fn with_base(base: &str) -> Self {
        Api {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base, endpoint)
    }

    async fn check(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Server {
            endpoint: endpoint.to_string(),
            message: extract_server_error(status.as_u16(), &body),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self.http.get(self.url(endpoint)).send().await?;
        let response = Self::check(endpoint, response).await?;
        Ok(response.json().await?)
    }

    async fn post_json(&self, endpoint: &str, body: &impl Serialize) -> Result<(), ApiError> {
        let response = self.http.post(self.url(endpoint)).json(body).send().await?;
        Self::check(endpoint, response).await?;
        Ok(())
    }

    pub async fn get_state(&self) -> Result<StateSnapshot, ApiError> {
        self.get_json("/state").await
    }

    pub async fn get_chat_history(&self) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json("/chat_history").await
    }

    pub async fn get_paint_canvas(&self) -> Result<PaintCanvas, ApiError> {
        self.get_json("/get_paint_canvas").await
    }

    /// Delta log strictly after the cursor; no cursor means "from the top".
    pub async fn get_paint_events(&self, since: Option<&str>) -> Result<Vec<PaintEvent>, ApiError> {
        let endpoint = match since {
            Some(cursor) => format!("/paint_events?since={cursor}"),
            None => "/paint_events".to_string(),
        };
        self.get_json(&endpoint).await
    }

    pub async fn get_activity(&self) -> Result<ActivityPointer, ApiError> {
        self.get_json("/activity").await
    }

    pub async fn get_bbybook(&self) -> Result<BbyBook, ApiError> {
        self.get_json("/bbybook").await
    }

    pub async fn post_say(&self, text: &str, author: &str, colour: Rgb) -> Result<(), ApiError> {
        self.post_json(
            "/say",
            &json!({
                "text": text,
                "author": author,
                "colour": { "r": colour.r, "g": colour.g, "b": colour.b },
                "platform": "bby-client",
                "show": true,
            }),
        )
        .await
    }

    pub async fn post_state_change(&self, updates: &serde_json::Value) -> Result<(), ApiError> {
        self.post_json("/set", updates).await
    }

    pub async fn post_pixels(&self, pixels: &[PixelWrite]) -> Result<(), ApiError> {
        self.post_json("/paint_pixel", &json!({ "pixels": pixels })).await
    }

    pub async fn post_snapshot(&self, label: &str, png_b64: &str) -> Result<(), ApiError> {
        self.post_json(
            "/snapshot",
            &json!({ "label": label, "composite_png_b64": png_b64 }),
        )
        .await
    }

    pub async fn post_attach_png(&self, snap_id: &str, png_b64: &str) -> Result<(), ApiError> {
        let endpoint = format!("/snapshot_attach_png/{snap_id}");
        self.post_json(&endpoint, &json!({ "composite_png_b64": png_b64 })).await
    }

    /// Gallery saves ship the PNG bytes raw, with author and label riding
    /// in headers instead of the body.
    pub async fn post_save_to_gallery(
        &self,
        png: Vec<u8>,
        author: &str,
        label: &str,
    ) -> Result<(), ApiError> {
        let endpoint = "/gallery/save";
        let response = self
            .http
            .post(self.url(endpoint))
            .header("content-type", "image/png")
            .header("x-author", author)
            .header("x-label", label)
            .body(png)
            .send()
            .await?;
        Self::check(endpoint, response).await?;
        Ok(())
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort extraction of the server's error message; falls back to the
/// bare status code when the body isn't the usual {"error": ...} shape.
fn extract_server_error(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => format!("server responded with {status}"),
    }
}
