pub mod amount;
pub mod completion;
pub mod directive;
pub mod error;
pub mod mode_gate;
pub mod pending_operation;
pub mod progress;
pub mod recorded_handler;
pub mod register_store;
pub mod session;
pub mod session_store;
pub mod task_queue;
pub mod tool_dispatch;
pub mod tool_protocol;

pub use completion::{AcknowledgeOutcome, CompletionReport};
pub use directive::{ControlDirective, DirectiveOutcome};
pub use error::OrchestratorError;
pub use session::{Session, SessionSnapshot};
pub use session_store::SessionStore;
