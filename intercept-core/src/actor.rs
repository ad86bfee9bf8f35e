//! Single-owner task around [`InterceptController`]
//!
//! Every mutation of sessions and paused responses goes through one task,
//! so commands and host events are applied strictly one after another in
//! arrival order. Callers hold a cloneable [`ControllerHandle`].

use crate::controller::InterceptController;
use crate::correlation::InterceptionKey;
use crate::error::{InterceptError, InterceptResult};
use crate::host::HostEvent;
use intercept_common::{
    CommandResult, ControlRequest, ControlResponse, EditorSnapshot, InterceptionStatus, RequestId,
    TabId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Messages processed by the controller task
#[derive(Debug)]
pub enum ControllerCommand {
    Dispatch {
        request: ControlRequest,
        reply: oneshot::Sender<ControlResponse>,
    },
    Event(HostEvent),
    EditorClosed {
        tab_id: TabId,
        request_id: RequestId,
        reply: oneshot::Sender<CommandResult>,
    },
    Snapshot {
        tab_id: TabId,
        request_id: RequestId,
        reply: oneshot::Sender<Option<EditorSnapshot>>,
    },
    Pending {
        reply: oneshot::Sender<Vec<InterceptionKey>>,
    },
    ActiveTabs {
        reply: oneshot::Sender<Vec<TabId>>,
    },
    PurgeOrphans {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable sender side of the controller task
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerCommand>,
}

/// Move the controller into its own task.
///
/// The task stops on [`ControllerHandle::shutdown`] or once every handle is
/// dropped; either way all paused responses are resumed first.
pub fn spawn(controller: InterceptController) -> (ControllerHandle, JoinHandle<()>) {
    let capacity = controller.config().channel_capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(run(controller, rx));
    (ControllerHandle { tx }, task)
}

async fn run(mut controller: InterceptController, mut rx: mpsc::Receiver<ControllerCommand>) {
    info!("interception controller started");

    while let Some(command) = rx.recv().await {
        match command {
            ControllerCommand::Dispatch { request, reply } => {
                let response = controller.dispatch(request).await;
                let _ = reply.send(response);
            }
            ControllerCommand::Event(event) => controller.handle_event(event).await,
            ControllerCommand::EditorClosed {
                tab_id,
                request_id,
                reply,
            } => {
                let result = match controller.on_editor_closed(tab_id, &request_id).await {
                    Ok(()) => CommandResult::ok(),
                    Err(err) => err.to_result(),
                };
                let _ = reply.send(result);
            }
            ControllerCommand::Snapshot {
                tab_id,
                request_id,
                reply,
            } => {
                let snapshot = controller.paused(tab_id, &request_id).map(|p| p.snapshot());
                let _ = reply.send(snapshot);
            }
            ControllerCommand::Pending { reply } => {
                let _ = reply.send(controller.pending_keys());
            }
            ControllerCommand::ActiveTabs { reply } => {
                let _ = reply.send(controller.active_tabs());
            }
            ControllerCommand::PurgeOrphans { reply } => {
                let purged = controller.purge_orphans().await;
                let _ = reply.send(purged);
            }
            ControllerCommand::Shutdown { reply } => {
                controller.shutdown().await;
                let _ = reply.send(());
                info!("interception controller stopped");
                return;
            }
        }
    }

    debug!("all controller handles dropped");
    controller.shutdown().await;
    info!("interception controller stopped");
}

impl ControllerHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> InterceptResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| InterceptError::ControllerUnavailable)?;
        rx.await.map_err(|_| InterceptError::ControllerUnavailable)
    }

    /// Send a control message, failing if the task is gone
    pub async fn request(&self, request: ControlRequest) -> InterceptResult<ControlResponse> {
        self.call(|reply| ControllerCommand::Dispatch { request, reply })
            .await
    }

    /// Send a control message; an unreachable task becomes a failure result
    pub async fn dispatch(&self, request: ControlRequest) -> ControlResponse {
        match self.request(request).await {
            Ok(response) => response,
            Err(err) => err.to_result().into(),
        }
    }

    pub async fn status(&self, tab_id: TabId) -> InterceptResult<InterceptionStatus> {
        match self.request(ControlRequest::GetStatus { tab_id }).await? {
            ControlResponse::Status(status) => Ok(status),
            ControlResponse::Result(_) => Ok(InterceptionStatus::default()),
        }
    }

    /// Queue a host event; events keep their arrival order
    pub async fn notify(&self, event: HostEvent) -> InterceptResult<()> {
        self.tx
            .send(ControllerCommand::Event(event))
            .await
            .map_err(|_| InterceptError::ControllerUnavailable)
    }

    pub async fn editor_closed(&self, tab_id: TabId, request_id: impl Into<RequestId>) -> InterceptResult<CommandResult> {
        let request_id = request_id.into();
        self.call(|reply| ControllerCommand::EditorClosed {
            tab_id,
            request_id,
            reply,
        })
        .await
    }

    pub async fn snapshot(
        &self,
        tab_id: TabId,
        request_id: impl Into<RequestId>,
    ) -> InterceptResult<Option<EditorSnapshot>> {
        let request_id = request_id.into();
        self.call(|reply| ControllerCommand::Snapshot {
            tab_id,
            request_id,
            reply,
        })
        .await
    }

    /// Keys of every paused response, across tabs
    pub async fn pending(&self) -> InterceptResult<Vec<InterceptionKey>> {
        self.call(|reply| ControllerCommand::Pending { reply }).await
    }

    pub async fn active_tabs(&self) -> InterceptResult<Vec<TabId>> {
        self.call(|reply| ControllerCommand::ActiveTabs { reply }).await
    }

    pub async fn purge_orphans(&self) -> InterceptResult<usize> {
        self.call(|reply| ControllerCommand::PurgeOrphans { reply }).await
    }

    pub async fn shutdown(&self) -> InterceptResult<()> {
        self.call(|reply| ControllerCommand::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
