//! Handle for communicating with the orchestrator.
//!
//! The `OrchestratorHandle` provides a cloneable interface for sending
//! messages to the orchestrator and subscribing to wallpaper events.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use super::messages::{
    ConfigChange, FetchTrigger, OrchestratorError, OrchestratorMessage, OrchestratorQuery,
    QueryResult, StatusSnapshot,
};
use crate::events::WallpaperEvent;
use crate::metamodel::EditableItem;
use crate::processing::PostProcessParams;

/// Error types for actor communication.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// Failed to send message to actor.
    #[error("Failed to send message to orchestrator: channel closed")]
    SendFailed,

    /// Failed to receive response from actor.
    #[error("Failed to receive response from orchestrator: channel closed")]
    ReceiveFailed,

    /// Query timed out.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

/// Handle for communicating with the orchestrator.
///
/// This handle is cheap to clone and can be shared across threads.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorMessage>,
    events: broadcast::Sender<WallpaperEvent>,
}

impl OrchestratorHandle {
    pub(crate) const fn new(
        sender: mpsc::Sender<OrchestratorMessage>,
        events: broadcast::Sender<WallpaperEvent>,
    ) -> Self {
        Self { sender, events }
    }

    /// Receives every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WallpaperEvent> { self.events.subscribe() }

    // ========================================================================
    // Fire-and-forget sending
    // ========================================================================

    /// Send a message without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the orchestrator has stopped or
    /// its inbox is full.
    pub fn send(&self, msg: OrchestratorMessage) -> Result<(), ActorError> {
        self.sender.try_send(msg).map_err(|_| ActorError::SendFailed)
    }

    /// Send a message and wait for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the channel is closed.
    pub async fn send_async(&self, msg: OrchestratorMessage) -> Result<(), ActorError> {
        self.sender.send(msg).await.map_err(|_| ActorError::SendFailed)
    }

    /// Starts a new fetch, superseding any fetch in flight.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the channel is closed.
    pub async fn fetch_now(&self, trigger: FetchTrigger) -> Result<(), ActorError> {
        self.send_async(OrchestratorMessage::BeginFetch(trigger)).await
    }

    /// Replaces the pipeline parameters for the next run.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the channel is closed.
    pub async fn set_processing(&self, params: PostProcessParams) -> Result<(), ActorError> {
        self.send_async(OrchestratorMessage::ConfigChanged(ConfigChange::Processing(params)))
            .await
    }

    // ========================================================================
    // Commands with a reply
    // ========================================================================

    /// Makes `name` the active source and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns the activation failure, or [`OrchestratorError::Actor`] if
    /// the orchestrator is gone.
    pub async fn activate_source(&self, name: &str) -> Result<(), OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.send_async(OrchestratorMessage::ActivateSource {
            name: name.to_string(),
            respond_to: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ActorError::ReceiveFailed)?
    }

    /// Validates and applies edited settings of `source`.
    ///
    /// # Errors
    ///
    /// Returns the validation or persistence failure, or
    /// [`OrchestratorError::Actor`] if the orchestrator is gone.
    pub async fn update_source_settings(
        &self,
        source: &str,
        items: Vec<EditableItem>,
    ) -> Result<(), OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.send_async(OrchestratorMessage::ConfigChanged(ConfigChange::SourceSettings {
            source: source.to_string(),
            items,
            respond_to: Some(tx),
        }))
        .await?;
        rx.await.map_err(|_| ActorError::ReceiveFailed)?
    }

    /// Asks the orchestrator to stop and waits until it has.
    pub async fn shutdown(&self) {
        if self.sender.send(OrchestratorMessage::Shutdown).await.is_ok() {
            self.sender.closed().await;
        }
    }

    // ========================================================================
    // Query methods
    // ========================================================================

    /// Execute a query and wait for the result.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the channel is closed, or
    /// [`ActorError::ReceiveFailed`] if the response channel is closed.
    pub async fn query(&self, query: OrchestratorQuery) -> Result<QueryResult, ActorError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(OrchestratorMessage::Query { query, respond_to: tx })
            .await
            .map_err(|_| ActorError::SendFailed)?;

        rx.await.map_err(|_| ActorError::ReceiveFailed)
    }

    /// Execute a query with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Timeout`] if the query doesn't complete in time,
    /// or any error from [`Self::query`].
    pub async fn query_timeout(
        &self,
        query: OrchestratorQuery,
        timeout: Duration,
    ) -> Result<QueryResult, ActorError> {
        tokio::time::timeout(timeout, self.query(query))
            .await
            .map_err(|_| ActorError::Timeout(timeout))?
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the orchestrator fails.
    pub async fn status(&self) -> Result<StatusSnapshot, ActorError> {
        self.query(OrchestratorQuery::Status)
            .await?
            .into_status()
            .ok_or(ActorError::ReceiveFailed)
    }

    /// Editable settings of the active source.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the orchestrator fails.
    pub async fn settings(&self) -> Result<Option<Vec<EditableItem>>, ActorError> {
        self.query(OrchestratorQuery::Settings)
            .await?
            .into_settings()
            .ok_or(ActorError::ReceiveFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (OrchestratorHandle, mpsc::Receiver<OrchestratorMessage>) {
        let (tx, rx) = mpsc::channel(4);
        let (events, _) = broadcast::channel(4);
        (OrchestratorHandle::new(tx, events), rx)
    }

    #[tokio::test]
    async fn test_send_delivers_message() {
        let (handle, mut rx) = handle();
        handle.send(OrchestratorMessage::BeginFetch(FetchTrigger::Manual)).unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, OrchestratorMessage::BeginFetch(FetchTrigger::Manual)));
    }

    #[tokio::test]
    async fn test_send_fails_when_closed() {
        let (handle, rx) = handle();
        drop(rx);

        assert!(matches!(
            handle.send(OrchestratorMessage::Shutdown),
            Err(ActorError::SendFailed)
        ));
        assert!(matches!(
            handle.fetch_now(FetchTrigger::Manual).await,
            Err(ActorError::SendFailed)
        ));
    }

    #[tokio::test]
    async fn test_query_fails_when_reply_dropped() {
        let (handle, mut rx) = handle();
        tokio::spawn(async move {
            // Drop the responder without answering.
            let _ = rx.recv().await;
        });

        assert!(matches!(handle.status().await, Err(ActorError::ReceiveFailed)));
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let (handle, mut rx) = handle();
        let keep = tokio::spawn(async move {
            let msg = rx.recv().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(msg);
        });

        let result = handle
            .query_timeout(OrchestratorQuery::Status, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ActorError::Timeout(_))));
        keep.abort();
    }

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let (tx, _rx) = mpsc::channel(1);
        let (events, _) = broadcast::channel(4);
        let handle = OrchestratorHandle::new(tx, events.clone());
        let mut subscriber = handle.subscribe();

        events.send(WallpaperEvent::Changing).unwrap();
        assert_eq!(subscriber.recv().await.unwrap(), WallpaperEvent::Changing);
    }
}
