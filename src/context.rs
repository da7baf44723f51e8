use uuid::Uuid;

/// Per-batch reporting context handed to every assembly step.
///
/// Created by the orchestrator for each batch; its fields are attached to
/// the tracing spans of every step so nested log lines carry the run.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub username: String,
    pub run_id: Uuid,
}

impl SyncContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            run_id: Uuid::new_v4(),
        }
    }
}
