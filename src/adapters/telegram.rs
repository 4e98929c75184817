//! Public Telegram channel search via the web preview.
//!
//! `https://t.me/s/<channel>?q=<keyword>` renders the latest matching posts
//! as HTML without a bot token. Messages are scraped out of the widget
//! markup; anything that doesn't look like a message is skipped.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChannelError, MessageSource};
use crate::config::TelegramSettings;

/// One post from a channel preview page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Plain text, tags stripped
    pub text: String,

    /// `datetime` attribute of the post's `<time>` element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Permalink built from `data-post`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Reads channel search results from the public preview
pub struct TelegramChannelSource {
    base_url: String,
    client: reqwest::Client,
}

impl TelegramChannelSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_settings(settings: &TelegramSettings, timeout: Duration) -> Self {
        Self::new(settings.base_url.clone(), timeout)
    }

    /// Preview page URL for a channel search
    fn search_url(&self, channel: &str) -> String {
        format!("{}/s/{}", self.base_url, channel.trim_start_matches('@'))
    }
}

#[async_trait]
impl MessageSource for TelegramChannelSource {
    async fn search(
        &self,
        channel: &str,
        keyword: &str,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        let url = self.search_url(channel);

        let response = self
            .client
            .get(&url)
            .query(&[("q", keyword)])
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status {
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let messages = parse_preview(&self.base_url, &html);
        debug!(channel, keyword, count = messages.len(), "Fetched channel messages");
        Ok(messages)
    }
}

/// Extract messages from a preview page
pub fn parse_preview(base_url: &str, html: &str) -> Vec<ChannelMessage> {
    let document = Html::parse_document(html);

    let wrap_sel = Selector::parse(".tgme_widget_message_wrap").unwrap_or_else(|_| unreachable!());
    let text_sel = Selector::parse(".tgme_widget_message_text").unwrap_or_else(|_| unreachable!());
    let time_sel = Selector::parse("time[datetime]").unwrap_or_else(|_| unreachable!());
    let post_sel = Selector::parse("[data-post]").unwrap_or_else(|_| unreachable!());

    document
        .select(&wrap_sel)
        .filter_map(|wrap| {
            let text = wrap.select(&text_sel).next().map(element_text)?;
            if text.is_empty() {
                return None;
            }

            let date = wrap
                .select(&time_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(str::to_string);

            let url = wrap
                .select(&post_sel)
                .next()
                .and_then(|p| p.value().attr("data-post"))
                .map(|post| format!("{}/{}", base_url, post));

            Some(ChannelMessage { text, date, url })
        })
        .collect()
}

/// Text content of an element with `<br>` as newlines
fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text.replace('\u{a0}', " ").trim().to_string()
}
