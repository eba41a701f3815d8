//! Sandbox Execution Runner
//!
//! Runs generated scene source in an out-of-process renderer:
//! - each job owns an exclusive working directory, removed on drop
//! - the renderer runs with a cleared environment, a timeout and bounded
//!   output capture
//! - the produced artifact is found by directory convention under
//!   `media/videos/<job_id>/<resolution>/`

#![warn(unreachable_pub)]

pub mod discover;
pub mod error;
pub mod quality;
pub mod runner;
pub mod state;
pub mod workspace;

pub use discover::{discover_output, expected_output_dir};
pub use error::RenderError;
pub use quality::RenderQuality;
pub use runner::{CapturedOutput, ExecutionResult, ManimRenderer, RendererConfig, SceneRenderer};
pub use state::ExecutionState;
pub use workspace::{JobWorkspace, WorkspaceRegistry};

/// Scene class the renderer invokes, shared with the code generator
pub use motion_codegen::ENTRY_POINT;
