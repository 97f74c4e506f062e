//! Outbound dispatch: channel gate, schedule, sender identity, the
//! per-message pipeline and the lifecycle orchestrator on top of it.

pub mod gate;
pub mod orchestrator;
pub mod pipeline;
pub mod reply_to;
pub mod schedule;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use pipeline::{DispatchRequest, MessageDispatcher, TemplateConfig};
pub use schedule::compute_send_at;
