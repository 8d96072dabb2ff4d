//! Inbound callback poller
//!
//! Long-polls the bot's update feed and routes button presses to the
//! download coordinator. If a callback arrives whose tag cannot be parsed
//! (old client, edited message), the request id is recovered from the
//! store by the message id that carried the dialogue.

use std::sync::Arc;

use felarr_core::{
    ApprovalDecision, ApprovalGateway, ApprovalResponder, ApprovalResult, PendingStore, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::approval::parse_callback_data;
use crate::telegram::{CallbackQuery, TelegramClient};

pub struct CallbackPoller {
    client: Arc<TelegramClient>,
    responder: Arc<dyn ApprovalResponder>,
    gateway: Arc<dyn ApprovalGateway>,
    pending_store: Arc<dyn PendingStore>,
}

impl CallbackPoller {
    pub fn new(
        client: Arc<TelegramClient>,
        responder: Arc<dyn ApprovalResponder>,
        gateway: Arc<dyn ApprovalGateway>,
        pending_store: Arc<dyn PendingStore>,
    ) -> Self {
        Self {
            client,
            responder,
            gateway,
            pending_store,
        }
    }

    /// Run until cancelled. Errors are logged and polling continues; the
    /// loop itself never terminates on its own.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut offset = 0i64;
        info!("telegram callback poller started");

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("callback poller stopping");
                    return;
                }
                result = self.client.get_updates(offset) => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(err) => {
                    error!(%err, "getUpdates failed; backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(callback) = update.callback_query {
                    if let Err(err) = self.handle_callback(callback).await {
                        error!(%err, "callback handling failed");
                    }
                }
            }
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<()> {
        let data = callback.data.as_deref().unwrap_or_default();
        let message_id = callback.message.as_ref().map(|m| m.message_id);

        let (approved, request_id) = match parse_callback_data(data) {
            Some((approved, request_id)) => (approved, request_id.to_string()),
            None => {
                // Tag unreadable; recover the request from the message id.
                let Some(message_id) = message_id else {
                    warn!(data, "unparseable callback without message context");
                    self.client
                        .answer_callback_query(&callback.id, "Request no longer known")
                        .await?;
                    return Ok(());
                };
                match self.pending_store.find_by_message_id(message_id).await? {
                    Some(pending) => (data.starts_with("dl_yes"), pending.request_id),
                    None => {
                        self.client
                            .answer_callback_query(&callback.id, "Request expired or already processed")
                            .await?;
                        return Ok(());
                    }
                }
            }
        };

        let decision = if approved {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Declined
        };

        let result = self.responder.handle_approval(&request_id, decision).await?;

        if let Some(message_id) = message_id {
            if let Err(err) = self.gateway.finalize_approval(message_id, &result).await {
                error!(%err, message_id, "failed to edit approval message");
            }
        }

        let answer = match &result {
            ApprovalResult::Started { .. } => "Download started! 🚀",
            ApprovalResult::Skipped { .. } => "Skipped",
            ApprovalResult::Failed { .. } => "Download failed",
            ApprovalResult::Expired { .. } => "Request expired",
            ApprovalResult::AlreadyHandled { .. } => "Already processed",
        };
        self.client
            .answer_callback_query(&callback.id, answer)
            .await
    }
}
