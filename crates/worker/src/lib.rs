// repository-sync-worker: validation, workspaces and the git sync pipeline.

pub mod clone;
pub mod engine;
pub mod git;
pub mod outcome;
pub mod pipeline;
pub mod validate;
pub mod workspace;
