//! Scene source normalization and validation
//!
//! Model output is normalized (fences stripped, blank edges trimmed), then
//! parsed with tree-sitter. Source is accepted only if it parses cleanly and
//! defines a top-level class named [`ENTRY_POINT`].

use crate::error::GenerationError;

/// Scene class name the renderer invokes
pub const ENTRY_POINT: &str = "GeneratedScene";

const FENCE: &str = "```";

/// Top-level class found in scene source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneClass {
    pub name: String,
    /// Raw base-class list, e.g. `(Scene)`
    pub bases: Option<String>,
    /// 1-based
    pub line: usize,
}

/// Scene source that parsed and defines the entry point
#[derive(Debug, Clone)]
pub struct SceneSource {
    source: String,
    classes: Vec<SceneClass>,
}

impl SceneSource {
    /// Parse and validate scene source
    ///
    /// # Errors
    /// - `Empty` for blank source
    /// - `Syntax` if tree-sitter reports an error node
    /// - `MissingEntryPoint` if no top-level `GeneratedScene` class exists
    pub fn parse(source: &str) -> Result<Self, GenerationError> {
        if source.trim().is_empty() {
            return Err(GenerationError::Empty);
        }

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| GenerationError::Config(format!("parser init: {e}")))?;

        let tree = parser
            .parse(source, None)
            .ok_or(GenerationError::Syntax { line: 1 })?;
        let root = tree.root_node();

        if root.has_error() {
            let line = first_error_line(&root).unwrap_or(1);
            return Err(GenerationError::Syntax { line });
        }

        let mut classes = Vec::new();
        for i in 0..root.child_count() {
            if let Some(child) = root.child(i) {
                collect_class(&child, source, &mut classes);
            }
        }

        if !classes.iter().any(|c| c.name == ENTRY_POINT) {
            return Err(GenerationError::MissingEntryPoint {
                expected: ENTRY_POINT,
            });
        }

        Ok(Self {
            source: source.to_string(),
            classes,
        })
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.source
    }

    /// Top-level classes in declaration order
    #[inline]
    #[must_use]
    pub fn classes(&self) -> &[SceneClass] {
        &self.classes
    }

    /// The entry-point class
    #[must_use]
    pub fn entry_point(&self) -> Option<&SceneClass> {
        self.classes.iter().find(|c| c.name == ENTRY_POINT)
    }
}

fn collect_class(node: &tree_sitter::Node, source: &str, out: &mut Vec<SceneClass>) {
    match node.kind() {
        "class_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = name_node.utf8_text(source.as_bytes()).unwrap_or("").to_string();
            if name.is_empty() {
                return;
            }
            let bases = node
                .child_by_field_name("superclasses")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                .map(str::to_string);
            out.push(SceneClass {
                name,
                bases,
                line: node.start_position().row + 1,
            });
        }
        // @decorator\nclass X: ...
        "decorated_definition" => {
            if let Some(definition) = node.child_by_field_name("definition") {
                collect_class(&definition, source, out);
            }
        }
        _ => {}
    }
}

fn first_error_line(node: &tree_sitter::Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.has_error() || child.is_missing() {
                if let Some(line) = first_error_line(&child) {
                    return Some(line);
                }
            }
        }
    }
    None
}

/// Remove markdown code-fence wrapping from model output
///
/// Takes the body of the first fenced block when one exists, otherwise the
/// whole text. Trailing whitespace and leading blank lines are dropped;
/// leading indentation on the first code line is kept.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let Some(open) = raw.find(FENCE) else {
        return tidy(raw).to_string();
    };

    let after_open = &raw[open + FENCE.len()..];
    // skip the info string (`python`, `py`, ...)
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => "",
    };
    let body = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };
    tidy(body).to_string()
}

fn tidy(text: &str) -> &str {
    text.trim_end().trim_start_matches(['\r', '\n'])
}

/// Strip fences and validate in one step
///
/// # Errors
/// See [`SceneSource::parse`]
pub fn normalize_model_output(raw: &str) -> Result<SceneSource, GenerationError> {
    SceneSource::parse(&strip_code_fences(raw))
}
