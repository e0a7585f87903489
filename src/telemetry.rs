//! Push lifecycle telemetry.
//!
//! Every push attempt is bracketed by exactly one start and one end event.
//! [`PushSession`] owns the lifecycle: closing it consumes the session, and
//! dropping an unclosed session (panic, cancelled future) still reports the
//! end event as aborted.

use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// State of one push attempt, filled in as the push progresses
#[derive(Debug, Clone)]
pub struct PushLifecycle {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub local_image: bool,
    pub fast: bool,
    pub pipeline: bool,
    pub build_id: Option<String>,
    pub build_duration: Option<Duration>,
}

impl PushLifecycle {
    pub fn new(local_image: bool) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            local_image,
            fast: false,
            pipeline: false,
            build_id: None,
            build_duration: None,
        }
    }
}

/// Sink for push lifecycle events
pub trait Telemetry {
    fn start_push(&self, local_image: bool) -> PushLifecycle;
    fn end_push(&self, lifecycle: &PushLifecycle, error: Option<&(dyn StdError + 'static)>);
}

#[derive(Debug, Error)]
#[error("push aborted before completion")]
pub struct PushAborted;

/// Open push lifecycle; see the module docs for the closing guarantee
pub struct PushSession<'a> {
    telemetry: &'a dyn Telemetry,
    lifecycle: PushLifecycle,
    closed: bool,
}

impl<'a> PushSession<'a> {
    pub fn start(telemetry: &'a dyn Telemetry, local_image: bool) -> Self {
        Self {
            lifecycle: telemetry.start_push(local_image),
            telemetry,
            closed: false,
        }
    }

    pub fn lifecycle_mut(&mut self) -> &mut PushLifecycle {
        &mut self.lifecycle
    }

    /// Emit the end event for `result` and close the session
    pub fn close<T, E>(mut self, result: &Result<T, E>)
    where
        E: StdError + 'static,
    {
        self.closed = true;
        let error = result.as_ref().err().map(|e| e as &(dyn StdError + 'static));
        self.telemetry.end_push(&self.lifecycle, error);
    }
}

impl Drop for PushSession<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.telemetry.end_push(&self.lifecycle, Some(&PushAborted));
        }
    }
}

/// Emits lifecycle events as structured tracing records
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn start_push(&self, local_image: bool) -> PushLifecycle {
        let lifecycle = PushLifecycle::new(local_image);
        info!(
            event = "push.start",
            session = %lifecycle.session_id,
            local_image,
            "Push started"
        );
        lifecycle
    }

    fn end_push(&self, lifecycle: &PushLifecycle, error: Option<&(dyn StdError + 'static)>) {
        let duration_ms = (Utc::now() - lifecycle.started_at).num_milliseconds();
        let build_ms = lifecycle.build_duration.map(|d| d.as_millis() as u64);
        match error {
            None => info!(
                event = "push.end",
                session = %lifecycle.session_id,
                success = true,
                duration_ms,
                build_ms,
                build_id = lifecycle.build_id.as_deref(),
                fast = lifecycle.fast,
                pipeline = lifecycle.pipeline,
                local_image = lifecycle.local_image,
                "Push finished"
            ),
            Some(err) => warn!(
                event = "push.end",
                session = %lifecycle.session_id,
                success = false,
                duration_ms,
                build_ms,
                build_id = lifecycle.build_id.as_deref(),
                fast = lifecycle.fast,
                pipeline = lifecycle.pipeline,
                local_image = lifecycle.local_image,
                error = %err,
                "Push failed"
            ),
        }
    }
}
