// ABOUTME: Dispatch module - runs logical calls against the provider.
// ABOUTME: Bounded retry on quota rejection, async handles for spawned calls.

mod dispatcher;
mod handle;

pub use dispatcher::{RequestDispatcher, RetryPolicy, SendOptions};
pub use handle::SendHandle;
