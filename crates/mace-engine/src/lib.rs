//! Workflow state machine, dependency fan-out, bootstrap, and error recovery.

pub mod bootstrap;
pub mod naming;
pub mod recovery;
pub mod workflow;

pub use bootstrap::{bootstrap_workflow, load_plan};
pub use naming::material_id;
pub use recovery::apply_recovery;
pub use workflow::{fan_out, scan_pending_triggers, WorkflowEngine};
