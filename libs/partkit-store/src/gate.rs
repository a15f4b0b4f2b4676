//! Readiness gate for stores that connect asynchronously.

use tokio::sync::watch;

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum GateState {
    Pending,
    Open,
    Failed(String),
}

/// Operations issued before `connect` completes wait here. Waiters resume in
/// no particular order once the gate opens.
#[derive(Debug)]
pub struct ConnectionGate {
    state: watch::Sender<GateState>,
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Pending);
        Self { state }
    }

    pub fn open(&self) {
        self.state.send_replace(GateState::Open);
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.state.send_replace(GateState::Failed(reason.into()));
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == GateState::Open
    }

    /// Resolve once the gate opens; error if the connection failed.
    pub async fn wait(&self) -> Result<(), StoreError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != GateState::Pending)
            .await
            .map_err(|_| StoreError::Unavailable("connection gate closed".into()))?
            .clone();
        match state {
            GateState::Failed(reason) => Err(StoreError::Unavailable(reason)),
            _ => Ok(()),
        }
    }
}
