//! Event handlers and the machinery around them.

pub mod ci_failure;
pub mod ci_log;
pub mod merge_gate;
pub mod mirror;
pub mod pipeline_button;
pub mod pipeline_supervisor;
pub mod reconciler;
pub mod router;
pub mod scheduler;
pub mod template;

pub use ci_failure::CIFailureReporter;
pub use merge_gate::MergeGate;
pub use mirror::{CrossRepoMirror, GitCli, GitTransport, MirrorError, MirrorRemotes, PushOutcome};
pub use pipeline_button::PipelineButton;
pub use pipeline_supervisor::PipelineSupervisor;
pub use reconciler::{ReconcileReport, ReconcileSettings, RemoteResourceReconciler};
pub use router::{EventRouter, RouterContext};
pub use scheduler::{Scheduler, TokioScheduler};
pub use template::CommentTemplate;
