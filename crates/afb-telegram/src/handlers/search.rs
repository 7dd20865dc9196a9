use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, warn};

use afb_core::{
    domain::{ChatId, MediaFile},
    formatting::escape_html,
    utils::truncate_text,
};

use crate::router::AppState;

const MAX_RESULTS: usize = 10;
const MAX_NAME_CHARS: usize = 60;

/// Human-readable size, binary units.
fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{} {}", bytes.max(0), UNITS[0]);
    }
    format!("{size:.2} {}", UNITS[unit])
}

/// Queries that are commands, emoji-only or too short are not searched.
fn is_searchable(text: &str) -> bool {
    let t = text.trim();
    t.chars().filter(|c| c.is_alphanumeric()).count() >= 2
        && !t.starts_with(['/', ',', '.', '!', '#'])
}

fn render_results(query: &str, files: &[MediaFile]) -> String {
    let mut out = format!("Found {} file(s) for <b>{}</b>:\n", files.len(), escape_html(query));
    for f in files {
        out.push_str(&format!(
            "\n[{}] {}",
            format_size(f.file_size),
            escape_html(&truncate_text(&f.file_name, MAX_NAME_CHARS))
        ));
    }
    out
}

pub async fn handle_search(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !is_searchable(text) {
        return Ok(());
    }

    let files = match state.store.search_media(text.trim(), MAX_RESULTS).await {
        Ok(files) => files,
        Err(e) => {
            warn!(err = %e, "search failed");
            return Ok(());
        }
    };
    if files.is_empty() {
        debug!(query = %text, "no files found");
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    if let Err(e) = state
        .ctx
        .messenger
        .send_html(chat_id, &render_results(text.trim(), &files))
        .await
    {
        warn!(chat_id = chat_id.0, err = %e, "could not send search results");
    }
    Ok(())
}
