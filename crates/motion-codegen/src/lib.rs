//! Code Generator Adapter
//!
//! Turns a natural-language animation description into scene source:
//! - pins the animation library and output contract in a system instruction
//! - strips markdown fences the model adds anyway
//! - rejects empty output and output without the [`ENTRY_POINT`] scene
//!
//! [`ENTRY_POINT`] is shared with the sandbox runner, which invokes the scene
//! by exactly this name.

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod scene;

pub use client::{ChatCompletionGenerator, CodeGenerator, GeneratorConfig};
pub use error::GenerationError;
pub use prompt::system_instruction;
pub use scene::{normalize_model_output, strip_code_fences, SceneClass, SceneSource, ENTRY_POINT};
