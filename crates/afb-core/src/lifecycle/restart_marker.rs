use std::path::Path;

use tracing::{info, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::Delivery},
    Result,
};

pub const RESTART_CONFIRMATION: &str = "Restarted Successfully!";

/// The message that asked for a restart: two integers, chat id then message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartMarker {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl RestartMarker {
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split_whitespace();
        let (Some(chat), Some(msg), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Config(format!(
                "restart marker must hold exactly two integers, got {text:?}"
            )));
        };
        let chat_id = chat
            .parse::<i64>()
            .map_err(|_| Error::Config(format!("restart marker chat id {chat:?}")))?;
        let message_id = msg
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("restart marker message id {msg:?}")))?;
        Ok(Self {
            chat_id: ChatId(chat_id),
            message_id: MessageId(message_id),
        })
    }

    pub fn message(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// What happened to the restart marker on this start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkerOutcome {
    Absent,
    Unreadable { reason: String },
    Confirmed {
        marker: RestartMarker,
        delivery: Delivery,
    },
}

/// Read the marker (if any), confirm the restart by editing the original
/// message, and delete the file.
///
/// Nothing here is fatal: a bad marker or a failed edit is logged, and the file
/// is removed in every case so the confirmation is attempted at most once.
pub async fn consume_restart_marker(path: &Path, messenger: &dyn MessagingPort) -> MarkerOutcome {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MarkerOutcome::Absent,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "failed to read restart marker");
            remove_marker(path).await;
            return MarkerOutcome::Unreadable {
                reason: e.to_string(),
            };
        }
    };

    let outcome = match RestartMarker::parse(&text) {
        Ok(marker) => {
            let delivery = Delivery::of(
                &messenger
                    .edit_html(marker.message(), RESTART_CONFIRMATION)
                    .await,
            );
            match &delivery {
                Delivery::Delivered => info!(
                    chat_id = marker.chat_id.0,
                    message_id = marker.message_id.0,
                    "restart confirmed"
                ),
                Delivery::Failed { reason } => warn!(
                    chat_id = marker.chat_id.0,
                    message_id = marker.message_id.0,
                    reason = %reason,
                    "could not edit restart message"
                ),
            }
            MarkerOutcome::Confirmed { marker, delivery }
        }
        Err(e) => {
            warn!(path = %path.display(), err = %e, "ignoring malformed restart marker");
            MarkerOutcome::Unreadable {
                reason: e.to_string(),
            }
        }
    };

    remove_marker(path).await;
    outcome
}

async fn remove_marker(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), err = %e, "failed to delete restart marker");
        }
    }
}
