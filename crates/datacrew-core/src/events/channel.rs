use super::WorkflowEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Sending half of the workflow event stream.
#[derive(Clone, Default)]
pub struct EventChannel {
    sender: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl EventChannel {
    /// Creates a channel and the receiver a UI layer subscribes to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A channel without subscribers; events are discarded.
    pub fn disconnected() -> Self {
        Self { sender: None }
    }

    /// Creates a channel from an existing sender (for testing)
    pub fn from_sender(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sends an event.
    ///
    /// Events are dropped if the receiver has been closed.
    pub fn send(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.sender
            && let Err(error) = sender.send(event)
        {
            debug!("Workflow event dropped, receiver closed: {:?}", error.0);
        }
    }
}
