//! Async operation manager.
//!
//! Long-running tool invocations can be detached from the request that
//! started them. Each one becomes an [`AsyncOperation`] record keyed by an
//! opaque `op_<uuid>` identifier, and moves through a monotonic lifecycle:
//!
//! ```text
//! pending ──▶ running ──▶ completed
//!    │           ├──────▶ failed
//!    └───────────┴──────▶ cancelled
//! ```
//!
//! `completed`, `failed` and `cancelled` are terminal. Records are never
//! removed, so a caller can reconnect and still query an operation it
//! started earlier.
//!
//! The table sits behind one mutex. The lock is only taken to read or write
//! records and is never held while tool code runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{OperationError, ToolError};

/// A boxed unit of tool work that can be detached onto the runtime.
pub type OperationFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;

/// Lifecycle state of an async operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Created, work not yet started.
    Pending,
    /// Work is executing.
    Running,
    /// Work finished and produced a result.
    Completed,
    /// Work finished with an error.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl OperationStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one tracked invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncOperation {
    /// Unique identifier, `op_` followed by a UUID.
    pub operation_id: String,
    /// Tool being executed.
    pub tool_name: String,
    /// Validated arguments the tool was started with.
    pub arguments: Value,
    /// Current lifecycle state.
    pub status: OperationStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the work started executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was entered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Tool payload, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fraction of work done, `0.0` to `1.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Reason given when cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl AsyncOperation {
    fn new(tool_name: &str, arguments: Value) -> Self {
        Self {
            operation_id: format!("op_{}", Uuid::new_v4().simple()),
            tool_name: tool_name.to_string(),
            arguments,
            status: OperationStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            progress: None,
            cancellation_reason: None,
        }
    }

    /// Serialises the snapshot to JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

struct Entry {
    operation: AsyncOperation,
    abort: Option<AbortHandle>,
}

/// Tracks detached tool invocations.
#[derive(Default)]
pub struct OperationManager {
    entries: Mutex<IndexMap<String, Entry>>,
}

impl std::fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationManager").finish_non_exhaustive()
    }
}

impl OperationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a `pending` operation, detaches `work` onto the runtime and
    /// returns the new identifier without waiting for the work.
    pub async fn start(
        self: &Arc<Self>,
        tool_name: &str,
        arguments: Value,
        work: OperationFuture,
    ) -> String {
        let operation = AsyncOperation::new(tool_name, arguments);
        let id = operation.operation_id.clone();

        let mut entries = self.entries.lock().await;

        let manager = Arc::clone(self);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            manager.mark_running(&task_id).await;
            work.await
        });
        let abort = task.abort_handle();

        let manager = Arc::clone(self);
        let supervisor_id = id.clone();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(error.to_string()),
                Err(join_error) if join_error.is_cancelled() => return,
                Err(join_error) => {
                    tracing::error!(operation_id = %supervisor_id, error = %join_error, "Operation panicked");
                    Err("operation panicked".to_string())
                }
            };
            manager.finish(&supervisor_id, outcome).await;
        });

        entries.insert(
            id.clone(),
            Entry {
                operation,
                abort: Some(abort),
            },
        );
        drop(entries);

        tracing::info!(operation_id = %id, tool = %tool_name, "Started async operation");
        id
    }

    /// Returns a snapshot of one operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown identifiers.
    pub async fn status(&self, operation_id: &str) -> Result<AsyncOperation, OperationError> {
        let entries = self.entries.lock().await;
        entries
            .get(operation_id)
            .map(|e| e.operation.clone())
            .ok_or_else(|| OperationError::NotFound(operation_id.to_string()))
    }

    /// Returns the payload of a completed operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown identifiers and
    /// [`OperationError::NotCompleted`] when the operation is in any state
    /// other than `completed`.
    pub async fn result(&self, operation_id: &str) -> Result<Value, OperationError> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(operation_id)
            .ok_or_else(|| OperationError::NotFound(operation_id.to_string()))?;

        match entry.operation.status {
            OperationStatus::Completed => Ok(entry.operation.result.clone().unwrap_or(Value::Null)),
            status => Err(OperationError::NotCompleted {
                id: operation_id.to_string(),
                status,
            }),
        }
    }

    /// Lists operations in creation order, optionally filtered by status.
    pub async fn list(&self, filter: Option<OperationStatus>) -> Vec<AsyncOperation> {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|e| filter.map_or(true, |s| e.operation.status == s))
            .map(|e| e.operation.clone())
            .collect()
    }

    /// Cancels a pending or running operation.
    ///
    /// The record is marked `cancelled` immediately and the underlying task
    /// is aborted at its next await point.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown identifiers and
    /// [`OperationError::AlreadyTerminal`] if the operation already finished.
    pub async fn cancel(
        &self,
        operation_id: &str,
        reason: Option<&str>,
    ) -> Result<AsyncOperation, OperationError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(operation_id)
            .ok_or_else(|| OperationError::NotFound(operation_id.to_string()))?;

        let status = entry.operation.status;
        if status.is_terminal() {
            return Err(OperationError::AlreadyTerminal {
                id: operation_id.to_string(),
                status,
            });
        }

        if let Some(abort) = entry.abort.take() {
            abort.abort();
        }

        let op = &mut entry.operation;
        op.status = OperationStatus::Cancelled;
        op.completed_at = Some(Utc::now());
        op.cancellation_reason = Some(reason.unwrap_or("cancelled by caller").to_string());

        tracing::info!(operation_id, from = %status, "Cancelled async operation");
        Ok(op.clone())
    }

    /// Number of tracked operations.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing has been started.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn mark_running(&self, operation_id: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(operation_id) {
            let op = &mut entry.operation;
            if op.status == OperationStatus::Pending {
                op.status = OperationStatus::Running;
                op.started_at = Some(Utc::now());
                op.progress = Some(0.0);
                tracing::debug!(operation_id, "Operation running");
            }
        }
    }

    async fn finish(&self, operation_id: &str, outcome: Result<Value, String>) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(operation_id) else {
            return;
        };
        entry.abort = None;

        let op = &mut entry.operation;
        if op.status.is_terminal() {
            // Cancel won the race; the terminal state stands.
            return;
        }

        op.completed_at = Some(Utc::now());
        match outcome {
            Ok(value) => {
                op.status = OperationStatus::Completed;
                op.result = Some(value);
                op.progress = Some(1.0);
                tracing::info!(operation_id, tool = %op.tool_name, "Operation completed");
            }
            Err(message) => {
                op.status = OperationStatus::Failed;
                tracing::info!(operation_id, tool = %op.tool_name, error = %message, "Operation failed");
                op.error = Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    async fn wait_for_terminal(manager: &OperationManager, id: &str) -> AsyncOperation {
        for _ in 0..1000 {
            let op = manager.status(id).await.unwrap();
            if op.status.is_terminal() {
                return op;
            }
            tokio::task::yield_now().await;
        }
        panic!("operation {id} never finished");
    }

    fn gated(rx: oneshot::Receiver<()>, value: Value) -> OperationFuture {
        Box::pin(async move {
            let _ = rx.await;
            Ok(value)
        })
    }

    #[tokio::test]
    async fn lifecycle_pending_running_completed() {
        let manager = Arc::new(OperationManager::new());
        let (tx, rx) = oneshot::channel();

        let id = manager
            .start("add_numbers", json!({"a": 2, "b": 3}), gated(rx, json!({"result": 5})))
            .await;
        assert!(id.starts_with("op_"));
        assert_eq!(manager.status(&id).await.unwrap().status, OperationStatus::Pending);

        tokio::task::yield_now().await;
        let running = manager.status(&id).await.unwrap();
        assert_eq!(running.status, OperationStatus::Running);
        assert_eq!(running.progress, Some(0.0));
        assert!(running.started_at.is_some());

        tx.send(()).unwrap();
        let done = wait_for_terminal(&manager, &id).await;
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.progress, Some(1.0));
        assert_eq!(manager.result(&id).await.unwrap(), json!({"result": 5}));
    }

    #[tokio::test]
    async fn result_before_completion_is_distinct_error() {
        let manager = Arc::new(OperationManager::new());
        let (_tx, rx) = oneshot::channel();
        let id = manager.start("slow", json!({}), gated(rx, json!(1))).await;

        let err = tokio_test::assert_err!(manager.result(&id).await);
        assert!(matches!(err, OperationError::NotCompleted { .. }));

        let err = tokio_test::assert_err!(manager.result("op_missing").await);
        assert_eq!(err, OperationError::NotFound("op_missing".to_string()));
    }

    #[tokio::test]
    async fn failing_work_marks_failed() {
        let manager = Arc::new(OperationManager::new());
        let id = manager
            .start(
                "broken",
                json!({}),
                Box::pin(async { Err::<Value, _>(ToolError::execution("disk on fire")) }),
            )
            .await;

        let op = wait_for_terminal(&manager, &id).await;
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.error.unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn panicking_work_marks_failed() {
        let manager = Arc::new(OperationManager::new());
        let work: OperationFuture = Box::pin(async {
            let outcome: Result<Value, ToolError> = panic!("boom");
            outcome
        });
        let id = manager.start("explodes", json!({}), work).await;

        let op = wait_for_terminal(&manager, &id).await;
        assert_eq!(op.status, OperationStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_is_immediate_and_final() {
        let manager = Arc::new(OperationManager::new());
        let (tx, rx) = oneshot::channel();
        let id = manager.start("slow", json!({}), gated(rx, json!(1))).await;
        tokio::task::yield_now().await;

        let op = tokio_test::assert_ok!(manager.cancel(&id, Some("user asked")).await);
        assert_eq!(op.status, OperationStatus::Cancelled);
        assert_eq!(op.cancellation_reason.as_deref(), Some("user asked"));

        // Releasing the gate after cancellation must not resurrect it.
        let _ = tx.send(());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.status(&id).await.unwrap().status, OperationStatus::Cancelled);

        let err = manager.cancel(&id, None).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::AlreadyTerminal {
                status: OperationStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancel_completed_is_error() {
        let manager = Arc::new(OperationManager::new());
        let id = manager
            .start("quick", json!({}), Box::pin(async { Ok(json!(true)) }))
            .await;
        wait_for_terminal(&manager, &id).await;

        let err = manager.cancel(&id, None).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::AlreadyTerminal {
                status: OperationStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let manager = Arc::new(OperationManager::new());
        let (_tx, rx) = oneshot::channel();
        let slow = manager.start("slow", json!({}), gated(rx, json!(1))).await;
        let quick = manager
            .start("quick", json!({}), Box::pin(async { Ok(json!(2)) }))
            .await;
        wait_for_terminal(&manager, &quick).await;

        assert_eq!(manager.list(None).await.len(), 2);
        let completed = manager.list(Some(OperationStatus::Completed)).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].operation_id, quick);

        let running = manager.list(Some(OperationStatus::Running)).await;
        assert_eq!(running[0].operation_id, slow);
    }

    #[tokio::test]
    async fn identifiers_are_unique() {
        let manager = Arc::new(OperationManager::new());
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let id = manager
                .start("t", json!({}), Box::pin(async { Ok(Value::Null) }))
                .await;
            assert!(ids.insert(id));
        }
        assert_eq!(manager.len().await, 50);
    }

    #[test]
    fn status_parse_and_display() {
        for status in OperationStatus::ALL {
            assert_eq!(OperationStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(OperationStatus::parse("all"), None);
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }
}
