// ============================================================================
// Outbox Relay - At-Least-Once Delivery to Handlers
// ============================================================================

pub mod group;
pub mod handler;
pub mod processor;

pub use group::EventGroupProcessor;
pub use handler::{handler_fn, EventHandler, HandlerFn};
pub use processor::{EventProcessor, RelayConfig, RelayHandle};
