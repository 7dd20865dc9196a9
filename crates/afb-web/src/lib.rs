//! HTTP listener: liveness at `/`, a JSON status page at `/status`, plus any
//! routes the binary merges in.

use std::{net::SocketAddr, sync::Arc};

use afb_core::{
    config::Config,
    ports::{Listener, Store},
    session::SessionContext,
    Error, Result,
};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const ALIVE_TEXT: &str = "Bot is alive!";

/// How the bot is reached from outside (`URL`, `IS_STREAM`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublicEndpoint {
    pub url: String,
    pub streaming: bool,
}

impl From<&Config> for PublicEndpoint {
    fn from(cfg: &Config) -> Self {
        Self {
            url: cfg.public_url.clone(),
            streaming: cfg.is_stream,
        }
    }
}

#[derive(Clone)]
struct AppState {
    ctx: Arc<SessionContext>,
    store: Arc<dyn Store>,
    public: PublicEndpoint,
}

/// Build the router for one session. `extra` is merged last.
pub fn router(
    ctx: Arc<SessionContext>,
    store: Arc<dyn Store>,
    public: PublicEndpoint,
    extra: Option<Router>,
) -> Router {
    let app = Router::new()
        .route("/", get(alive_handler))
        .route("/status", get(status_handler))
        .with_state(AppState { ctx, store, public });
    match extra {
        Some(routes) => app.merge(routes),
        None => app,
    }
}

async fn alive_handler() -> &'static str {
    ALIVE_TEXT
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let indexed_files = match state.store.count_media().await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(err = %e, "status: failed to count media");
            None
        }
    };
    let body = serde_json::json!({
        "bot": state.ctx.me.first_name,
        "username": state.ctx.me.handle(),
        "uptime": state.ctx.readable_uptime(),
        "uptime_seconds": state.ctx.uptime().as_secs(),
        "indexed_files": indexed_files,
        "url": state.public.url,
        "streaming": state.public.streaming,
    });
    (StatusCode::OK, Json(body))
}

/// The `Listener` the lifecycle controller spawns once the session exists.
pub struct WebListener {
    port: u16,
    store: Arc<dyn Store>,
    public: PublicEndpoint,
    extra: Option<Router>,
}

impl WebListener {
    pub fn new(port: u16, store: Arc<dyn Store>, public: PublicEndpoint) -> Self {
        Self {
            port,
            store,
            public,
            extra: None,
        }
    }

    /// Routes served next to `/` and `/status` (e.g. a streaming endpoint).
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra = Some(routes);
        self
    }
}

#[async_trait]
impl Listener for WebListener {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn serve(self: Arc<Self>, ctx: Arc<SessionContext>) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let app = router(ctx, self.store.clone(), self.public.clone(), self.extra.clone());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::External(format!("bind {addr}: {e}")))?;
        info!(%addr, "web server listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::External(format!("web server: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afb_core::{
        domain::{BannedSets, BotIdentity, ChatId, MediaFile, MessageId, MessageRef, UserId},
        messaging::port::MessagingPort,
        ports::SaveOutcome,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    struct NullMessenger;

    #[async_trait]
    impl MessagingPort for NullMessenger {
        async fn send_html(&self, chat_id: ChatId, _html: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }
        async fn edit_html(&self, _msg: MessageRef, _html: &str) -> Result<()> {
            Ok(())
        }
        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            Ok(())
        }
    }

    struct CountingStore(u64);

    #[async_trait]
    impl Store for CountingStore {
        async fn load_banned(&self) -> Result<BannedSets> {
            Ok(BannedSets::default())
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn ensure_indexes(&self) -> Result<()> {
            Ok(())
        }
        async fn save_media(&self, _file: &MediaFile) -> Result<SaveOutcome> {
            Ok(SaveOutcome::Saved)
        }
        async fn search_media(&self, _query: &str, _limit: usize) -> Result<Vec<MediaFile>> {
            Ok(Vec::new())
        }
        async fn count_media(&self) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn ctx() -> Arc<SessionContext> {
        Arc::new(SessionContext {
            started_at: Utc::now() - chrono::Duration::seconds(65),
            banned: BannedSets::default(),
            me: BotIdentity {
                id: UserId(777),
                username: "autofilter_bot".to_string(),
                first_name: "Auto Filter".to_string(),
            },
            messenger: Arc::new(NullMessenger),
        })
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_reports_alive() {
        let app = router(ctx(), Arc::new(CountingStore(0)), PublicEndpoint::default(), None);
        let (status, body) = fetch(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Bot is alive!");
    }

    #[tokio::test]
    async fn status_reports_identity_and_counts() {
        let public = PublicEndpoint {
            url: "https://files.example.org/".to_string(),
            streaming: true,
        };
        let app = router(ctx(), Arc::new(CountingStore(12)), public, None);
        let (status, body) = fetch(app, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["bot"], "Auto Filter");
        assert_eq!(json["username"], "@autofilter_bot");
        assert_eq!(json["indexed_files"], 12);
        assert!(json["uptime_seconds"].as_u64().unwrap() >= 65);
        assert_eq!(json["url"], "https://files.example.org/");
        assert_eq!(json["streaming"], true);
    }

    #[tokio::test]
    async fn extra_routes_are_merged() {
        let extra = Router::new().route("/stream/:id", get(|| async { "streaming" }));
        let app = router(
            ctx(),
            Arc::new(CountingStore(0)),
            PublicEndpoint::default(),
            Some(extra),
        );
        let (status, body) = fetch(app.clone(), "/stream/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "streaming");

        let (status, _) = fetch(app, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let listener = Arc::new(WebListener::new(
            port,
            Arc::new(CountingStore(0)),
            PublicEndpoint::default(),
        ));
        let err = listener.serve(ctx()).await.unwrap_err();
        assert!(err.to_string().contains("bind"), "{err}");
    }
}
