//! Web服务器

use crate::handlers::{
    self, require_session, AppState,
};
use anemia_core::{AnemiaError, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// 上传体上限：照片字节加上multipart包装
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = Self::create_app(state);
        Self { addr, app }
    }

    fn create_app(state: AppState) -> Router {
        // 无需会话的路由：登录、会话查询、健康检查与照片字节
        let public = Router::new()
            .route("/login", get(handlers::login_page).post(handlers::login))
            .route("/session", get(handlers::session_state))
            .route("/health", get(handlers::health))
            .route("/blobs/*key", get(handlers::serve_blob));

        // 会话守卫之内的路由
        let protected = Router::new()
            .route("/logout", post(handlers::logout))
            .route("/home", get(handlers::list_patients))
            .route("/register-patient", post(handlers::register_patient))
            .route("/upload-photo/:patient_id", post(handlers::upload_photo))
            .route(
                "/patient/:patient_id",
                get(handlers::patient_details).delete(handlers::delete_patient),
            )
            .route("/pipeline", get(handlers::pipeline_state))
            .route("/notifications", get(handlers::take_notification))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                require_session,
            ));

        public
            .merge(protected)
            .fallback(handlers::fallback_redirect)
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
            .with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| AnemiaError::Transport(format!("web server terminated: {}", e)))?;
        Ok(())
    }
}
