//! Approval dialogue rendering and the outbound gateway

use std::sync::Arc;

use async_trait::async_trait;
use felarr_core::{ApprovalGateway, ApprovalRequest, ApprovalResult, Result};
use html_escape::encode_text;
use serde_json::json;
use tracing::info;

use crate::telegram::TelegramClient;

/// Callback tags carried by the inline buttons.
pub const CALLBACK_APPROVE_PREFIX: &str = "dl_yes_";
pub const CALLBACK_DECLINE_PREFIX: &str = "dl_no_";

/// Telegram-backed implementation of the approval gateway.
pub struct TelegramNotifier {
    client: Arc<TelegramClient>,
}

impl TelegramNotifier {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }

    fn render_approval(request: &ApprovalRequest) -> String {
        let title_with_year = match request.year {
            Some(year) => format!("{} ({})", request.movie_title, year),
            None => request.movie_title.clone(),
        };

        // Only the last path segment of the folder; full paths are noise
        // on a phone screen.
        let folder_display = request
            .target_folder
            .rsplit('/')
            .next()
            .unwrap_or(&request.target_folder);

        let mut message = String::new();
        message.push_str("🎬 <b>New Version Available!</b>\n\n");
        message.push_str(&format!("<b>Movie:</b> {}\n\n", encode_text(&title_with_year)));
        message.push_str(&format!(
            "📀 <b>Current Quality:</b>\n{}\n\n",
            encode_text(&request.current_quality)
        ));
        message.push_str(&format!(
            "⭐ <b>New Quality:</b>\n{}\n\n",
            encode_text(&request.new_quality)
        ));
        message.push_str(&format!(
            "💡 <b>Reason:</b> {}\n\n",
            encode_text(&request.upgrade_reason)
        ));
        if !folder_display.is_empty() {
            message.push_str(&format!("📂 <b>Folder:</b> {}\n\n", encode_text(folder_display)));
        }
        message.push_str("Download this version?");
        message
    }

    fn render_terminal(result: &ApprovalResult) -> Option<String> {
        match result {
            ApprovalResult::Started { movie_title } => Some(format!(
                "✅ <b>Download Started</b>\n\n{}\n\nDownload has been queued.",
                encode_text(movie_title)
            )),
            ApprovalResult::Skipped { movie_title } => Some(format!(
                "❌ <b>Skipped</b>\n\n{}\n\nDownload was not queued.",
                encode_text(movie_title)
            )),
            ApprovalResult::Failed {
                movie_title,
                reason,
            } => Some(format!(
                "⚠️ <b>Download Failed</b>\n\n{}\n\n{}",
                encode_text(movie_title),
                encode_text(reason)
            )),
            ApprovalResult::Expired { movie_title } => Some(format!(
                "⏰ <b>Expired</b>\n\n{}\n\nApproval window elapsed.",
                encode_text(movie_title)
            )),
            ApprovalResult::AlreadyHandled { .. } => None,
        }
    }
}

#[async_trait]
impl ApprovalGateway for TelegramNotifier {
    async fn send_approval(&self, request: &ApprovalRequest) -> Result<i64> {
        let keyboard = json!({
            "inline_keyboard": [[
                {
                    "text": "✅ Download",
                    "callback_data": format!("{}{}", CALLBACK_APPROVE_PREFIX, request.request_id),
                },
                {
                    "text": "❌ Skip",
                    "callback_data": format!("{}{}", CALLBACK_DECLINE_PREFIX, request.request_id),
                },
            ]]
        });

        let message_id = self
            .client
            .send_message(&Self::render_approval(request), Some(keyboard))
            .await?;
        info!(
            request_id = request.request_id.as_str(),
            message_id, "approval request sent"
        );
        Ok(message_id)
    }

    async fn finalize_approval(&self, message_id: i64, result: &ApprovalResult) -> Result<()> {
        if let Some(text) = Self::render_terminal(result) {
            self.client.edit_message_text(message_id, &text).await?;
        }
        Ok(())
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.client.send_message(text, None).await.map(|_| ())
    }
}

/// Parse a button tag into (approved?, request_id).
pub fn parse_callback_data(data: &str) -> Option<(bool, &str)> {
    if let Some(request_id) = data.strip_prefix(CALLBACK_APPROVE_PREFIX) {
        return Some((true, request_id));
    }
    if let Some(request_id) = data.strip_prefix(CALLBACK_DECLINE_PREFIX) {
        return Some((false, request_id));
    }
    None
}
