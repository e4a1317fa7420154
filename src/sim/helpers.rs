//! Shared plumbing between the operator handle and the core task.

use tokio::sync::{mpsc, oneshot};

use crate::error::{SimError, SimResult};
use crate::sim::Command;
use crate::util::Reply;

/// Send a command to the core task and wait for its typed reply.
///
/// Both failure modes (core task gone before send, or gone before reply)
/// collapse into [`SimError::ChannelClosed`].
pub(crate) async fn send_command<T>(
    tx: &mpsc::Sender<Command>,
    make: impl FnOnce(Reply<T>) -> Command,
) -> SimResult<T> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(make(reply_tx))
        .await
        .map_err(|_| SimError::ChannelClosed)?;
    reply_rx.await.map_err(|_| SimError::ChannelClosed)
}

/// Get current timestamp in milliseconds since Unix epoch.
pub fn timestamp_now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
