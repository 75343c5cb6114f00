//! Session clock background task

use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::state::{AppState, SessionEvent};

/// Background task that drives one tick per second while a session is live.
///
/// Waits for `ExamStarted` (or a session that is already active, as after a
/// startup recovery), then runs an interval loop applying `AppState::tick()`
/// until the session deactivates or an end/reset event arrives. All state
/// transitions happen inside `tick()`; this task only paces it, so tests
/// drive the same entry point without wall-clock waits.
pub async fn session_clock_task(state: Arc<AppState>) {
    info!("Starting session clock task");

    let mut events = state.event_tx.subscribe();

    loop {
        let already_active = state
            .snapshot()
            .map(|session| session.is_exam_active)
            .unwrap_or(false);

        if !already_active {
            match events.recv().await {
                Ok(SessionEvent::ExamStarted { test_id }) => {
                    info!("Session clock running for test {}", test_id);
                }
                Ok(event) => {
                    debug!("Clock task idle, ignoring event: {:?}", event);
                    continue;
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Clock task lagged {} events while idle", skipped);
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("Event channel closed, stopping clock task");
                    return;
                }
            }
        }

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // the first interval tick completes immediately; skip it so the
        // budget only starts draining after one real second
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.tick() {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("Session inactive, stopping clock ticks");
                            break;
                        }
                        Err(e) => {
                            error!("Clock tick failed: {}", e);
                            break;
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(SessionEvent::ExamEnded) | Ok(SessionEvent::ExamReset) => {
                            info!("Session terminated, cancelling clock ticks");
                            break;
                        }
                        Ok(other) => {
                            debug!("Clock task observed event: {:?}", other);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Clock task lagged {} events", skipped);
                        }
                        Err(RecvError::Closed) => {
                            info!("Event channel closed, stopping clock task");
                            return;
                        }
                    }
                }
            }
        }
    }
}
