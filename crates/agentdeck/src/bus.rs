use tokio::sync::broadcast;

use crate::mutation::Mutation;
use crate::state::{Version, WorkspaceId};

/// Change notification emitted after a mutation has been applied and its
/// delta durably persisted.
#[derive(Debug, Clone)]
pub struct StateChanged {
    pub workspace_id: WorkspaceId,
    pub version: Version,
    pub mutation: Mutation,
}

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<StateChanged>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.sender.subscribe()
    }

    pub fn publish(
        &self,
        event: StateChanged,
    ) -> Result<usize, broadcast::error::SendError<StateChanged>> {
        self.sender.send(event)
    }
}
