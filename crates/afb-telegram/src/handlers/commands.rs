use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};

use afb_core::{
    domain::{ChatId, MessageRef, UserId},
    formatting::{escape_html, mention_html, mention_user_html},
    indexer::{index_chat, IndexReport},
    iter::MAX_POSITION,
    messaging::types::Delivery,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IndexArgs {
    chat_id: ChatId,
    limit: i64,
    offset: i64,
}

const INDEX_USAGE: &str = "Usage: <code>/index &lt;chat_id&gt; &lt;limit&gt; [offset]</code>";

fn parse_index_args(arg: &str) -> Option<IndexArgs> {
    let parts: Vec<&str> = arg.split_whitespace().collect();
    let (chat, limit, offset) = match parts.as_slice() {
        [chat, limit] => (*chat, *limit, "0"),
        [chat, limit, offset] => (*chat, *limit, *offset),
        _ => return None,
    };
    let args = IndexArgs {
        chat_id: ChatId(chat.parse().ok()?),
        limit: limit.parse().ok()?,
        offset: offset.parse().ok()?,
    };
    (args.offset >= 0 && args.limit > args.offset && args.limit <= MAX_POSITION).then_some(args)
}

async fn reply(state: &AppState, chat_id: ChatId, html: &str) -> Option<MessageRef> {
    let result = state.ctx.messenger.send_html(chat_id, html).await;
    if let Delivery::Failed { reason } = Delivery::of(&result) {
        warn!(chat_id = chat_id.0, reason = %reason, "reply failed");
    }
    result.ok()
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = ChatId(msg.chat.id.0);
    let user = msg.from();
    let user_id = user.map(|u| UserId(u.id.0 as i64));

    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            let who = match user {
                Some(u) => mention_user_html(UserId(u.id.0 as i64), &u.first_name),
                None => "there".to_string(),
            };
            let body = format!(
                "Hey {who}, I'm {bot}.\n\n\
I index the files posted in my channels and find them for you: \
just send the name of a movie or series.\n\n\
/uptime - How long I've been running",
                bot = mention_html(&state.ctx.me)
            );
            reply(&state, chat_id, &body).await;
        }

        "uptime" => {
            let body = format!(
                "<b>Uptime:</b> <code>{}</code>",
                state.ctx.readable_uptime()
            );
            reply(&state, chat_id, &body).await;
        }

        "index" => {
            if !user_id.is_some_and(|u| state.cfg.is_admin(u)) {
                return Ok(());
            }
            let Some(args) = parse_index_args(&arg) else {
                reply(&state, chat_id, INDEX_USAGE).await;
                return Ok(());
            };
            let Some(run) = state.indexing.begin() else {
                reply(&state, chat_id, "Wait until the previous index finishes.").await;
                return Ok(());
            };

            let status = reply(
                &state,
                chat_id,
                &format!(
                    "Indexing <code>{}</code> from {} to {}...\nSend /cancel to stop.",
                    args.chat_id.0, args.offset, args.limit
                ),
            )
            .await;

            let state = state.clone();
            tokio::spawn(async move {
                let outcome = run_index(&state, args, run.token()).await;
                drop(run);
                let body = match outcome {
                    Ok(report) if report.cancelled => format!(
                        "Indexing cancelled. {}\nResume with offset <code>{}</code>.",
                        report.summary(),
                        report.last_offset
                    ),
                    Ok(report) => format!("Indexing finished. {}", report.summary()),
                    Err(e) => {
                        error!(chat_id = args.chat_id.0, err = %e, "indexing failed");
                        format!("Indexing failed: <code>{}</code>", escape_html(&e.to_string()))
                    }
                };
                match status {
                    Some(msg) => {
                        if let Err(e) = state.ctx.messenger.edit_html(msg, &body).await {
                            warn!(err = %e, "could not edit index status");
                        }
                    }
                    None => {
                        reply(&state, chat_id, &body).await;
                    }
                }
            });
        }

        "cancel" => {
            if !user_id.is_some_and(|u| state.cfg.is_admin(u)) {
                return Ok(());
            }
            if state.indexing.cancel() {
                reply(&state, chat_id, "Cancelling the running index...").await;
            } else {
                reply(&state, chat_id, "Nothing is being indexed.").await;
            }
        }

        _ => {}
    }

    Ok(())
}

async fn run_index(
    state: &AppState,
    args: IndexArgs,
    cancel: &tokio_util::sync::CancellationToken,
) -> anyhow::Result<IndexReport> {
    info!(
        chat_id = args.chat_id.0,
        limit = args.limit,
        offset = args.offset,
        "index requested"
    );
    let report = index_chat(
        state.source.as_ref(),
        state.store.as_ref(),
        args.chat_id,
        args.limit,
        args.offset,
        &state.cfg.index_extensions,
        cancel,
    )
    .await?;
    Ok(report)
}
