//! System instruction for the model backend

use crate::scene::ENTRY_POINT;

/// Build the system instruction pinning library version and output contract
#[must_use]
pub fn system_instruction(library_version: &str) -> String {
    format!(
        "You are an expert in Manim Community Edition v{library_version}. \
Given a description of an animation, write one complete Python module that renders it.\n\
Rules:\n\
- Start with `from manim import *`.\n\
- Define exactly one scene class named `{ENTRY_POINT}` that derives from `Scene` \
(or another Manim scene base) and implements `construct(self)`.\n\
- Use only Manim Community Edition v{library_version} APIs.\n\
- Do not read or write files, open network connections or start processes.\n\
- Return only runnable Python source. No prose, no explanations, no markdown code fences."
    )
}
