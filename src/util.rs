/// One-shot reply channel paired with an operator command.
pub type Reply<T> = tokio::sync::oneshot::Sender<T>;
