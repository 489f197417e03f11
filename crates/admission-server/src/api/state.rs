use tokio::sync::Semaphore;

use crate::hooks::Hooks;

pub(crate) struct ApiServerState {
    /// Bounds the admission reviews evaluated at the same time
    pub(crate) semaphore: Semaphore,
    pub(crate) hooks: Hooks,
}
