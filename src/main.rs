//! Viva Session - A state-managed HTTP server for timed spoken-exam sessions
//!
//! This is the main entry point for the viva-session application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use viva_session::{
    api::create_router,
    config::Config,
    prefs::FilePreferenceStore,
    state::AppState,
    tasks::session_clock_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "viva_session={},tower_http=info",
            config.log_level()
        ))
        .init();

    info!("Starting viva-session server");
    info!(
        "Configuration: host={}, port={}, data_dir={}",
        config.host,
        config.port,
        config.data_dir.display()
    );

    // Durable mode preference + recovery record
    let prefs = Arc::new(FilePreferenceStore::new(&config.data_dir)?);

    // Create application state
    let state = Arc::new(AppState::new(config.port, config.host.clone(), prefs));

    // Start the session clock background task before recovery so a restored
    // session starts ticking immediately
    let clock_state = Arc::clone(&state);
    tokio::spawn(async move {
        session_clock_task(clock_state).await;
    });

    // Resume an interrupted session if the store holds a usable record
    match state.restore_from_recovery() {
        Ok(Some(session)) if session.is_exam_active => {
            info!(
                "Resumed exam session with {}s remaining",
                session.global_time_left
            );
        }
        Ok(Some(_)) => info!("Previous exam session had already expired"),
        Ok(None) => info!("No recoverable exam session found"),
        Err(e) => tracing::error!("Recovery failed: {}", e),
    }

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /exam/start                          - Begin a timed attempt");
    info!("  POST /exam/goto                           - Manual navigation (normal mode)");
    info!("  POST /exam/question/:id/skip-preparation  - Skip into recording");
    info!("  POST /exam/question/:id/audio             - Note captured audio");
    info!("  POST /exam/question/:id/submit            - Submit an answer");
    info!("  POST /exam/end                            - End the attempt");
    info!("  POST /exam/reset                          - Clear session state");
    info!("  GET  /exam/status                         - Session and clock status");
    info!("  GET/POST /mode                            - Exam mode preference");
    info!("  GET  /health                              - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
