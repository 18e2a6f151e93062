//! Domain models for the bridge.

pub mod action_result;
pub mod events;
pub mod policy;
pub mod remote;

// Re-export commonly used types
pub use action_result::{ActionResult, ActionStatus};
pub use events::{InboundEvent, Platform};
pub use policy::{AutoMergePolicy, CiFailurePolicy, LabelSpec, PolicyError, PolicySet, RepoPolicy};
pub use remote::{
    BranchRef, Deletion, Invitation, JobRef, MergeOutcome, PipelineRef, PipelineStatus,
    PullRequestRef, SourceHook, SourceHookSpec, TargetHook, TargetHookEvents, TargetHookSpec,
};
