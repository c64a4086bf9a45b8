//! MCP prompt templates.
//!
//! A prompt is a fixed instruction template with a few string arguments.
//! Rendering produces a single user-role message; the client's model is
//! expected to follow it using the docs tools.

use serde_json::{Map, Value};

use crate::errors::ToolError;

/// One argument accepted by a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptArgumentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    /// Closed set of accepted values, if any.
    pub allowed: &'static [&'static str],
    pub default: Option<&'static str>,
}

/// A rendered prompt ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub description: String,
    pub text: String,
}

pub trait PromptTemplate: Send + Sync {
    fn name(&self) -> &str;

    fn title(&self) -> &str;

    fn description(&self) -> &str;

    fn arguments(&self) -> Vec<PromptArgumentSpec>;

    /// Render with arguments already checked by [`resolve_arguments`].
    fn render(&self, args: &Map<String, Value>) -> String;
}

// ============ answer_from_docs ============

pub struct AnswerFromDocs;

impl PromptTemplate for AnswerFromDocs {
    fn name(&self) -> &str {
        "answer_from_docs"
    }

    fn title(&self) -> &str {
        "Answer Questions from Documentation"
    }

    fn description(&self) -> &str {
        "Answer a question grounded in the documentation. The assistant searches the docs, \
         retrieves the relevant pages and answers with citations."
    }

    fn arguments(&self) -> Vec<PromptArgumentSpec> {
        vec![PromptArgumentSpec {
            name: "question",
            description: "The question to answer from the documentation",
            required: true,
            allowed: &[],
            default: None,
        }]
    }

    fn render(&self, args: &Map<String, Value>) -> String {
        let question = arg_str(args, "question");
        format!(
            "You are a docs assistant. You MUST ground answers in the docs tool outputs. Use citations: (route, title).\n\n\
             Question: {question}\n\n\
             Instructions:\n\
             1) Call docs_search with a focused query.\n\
             2) Call docs_getPage for the top 2-3 hits.\n\
             3) Answer using only those sources; include citations like: [title](route).\n"
        )
    }
}

// ============ write_mdx_snippet ============

pub struct WriteMdxSnippet;

impl PromptTemplate for WriteMdxSnippet {
    fn name(&self) -> &str {
        "write_mdx_snippet"
    }

    fn title(&self) -> &str {
        "Write MDX Documentation Snippet"
    }

    fn description(&self) -> &str {
        "Draft new MDX documentation that matches the existing docs style. Searches existing \
         pages for terminology and patterns first."
    }

    fn arguments(&self) -> Vec<PromptArgumentSpec> {
        vec![
            PromptArgumentSpec {
                name: "topic",
                description: "The topic or feature to document",
                required: true,
                allowed: &[],
                default: None,
            },
            PromptArgumentSpec {
                name: "style",
                description: "Writing style: concise, tutorial or reference (default: concise)",
                required: false,
                allowed: &["concise", "tutorial", "reference"],
                default: Some("concise"),
            },
        ]
    }

    fn render(&self, args: &Map<String, Value>) -> String {
        let topic = arg_str(args, "topic");
        let style = arg_str(args, "style");
        format!(
            "You write MDX that matches an existing docs site tone. Prefer short sections, clear headings, and code blocks where useful.\n\n\
             Topic: {topic}\nStyle: {style}\n\n\
             Workflow:\n\
             - Use docs_search to find the closest existing pages/sections.\n\
             - Use docs_getPage to pull canonical terminology.\n\
             - Draft an MDX snippet with 2-4 headings and one example.\n"
        )
    }
}

fn arg_str<'a>(args: &'a Map<String, Value>, name: &str) -> &'a str {
    args.get(name).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Check prompt arguments: required ones present and non-empty, closed sets
/// respected, defaults filled in. All values must be strings.
pub fn resolve_arguments(
    specs: &[PromptArgumentSpec],
    args: Option<&Map<String, Value>>,
) -> Result<Map<String, Value>, ToolError> {
    let empty = Map::new();
    let args = args.unwrap_or(&empty);
    let mut resolved = Map::new();

    for spec in specs {
        let value = match args.get(spec.name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                return Err(ToolError::InvalidParams(format!(
                    "argument '{}' must be a string, got {}",
                    spec.name, other
                )))
            }
        };

        let value = match (value, spec.default) {
            (Some(v), _) => v,
            (None, Some(default)) => default,
            (None, None) if spec.required => {
                return Err(ToolError::InvalidParams(format!(
                    "missing required argument: {}",
                    spec.name
                )))
            }
            (None, None) => continue,
        };

        if spec.required && value.is_empty() {
            return Err(ToolError::InvalidParams(format!(
                "argument '{}' must not be empty",
                spec.name
            )));
        }
        if !spec.allowed.is_empty() && !spec.allowed.contains(&value) {
            return Err(ToolError::InvalidParams(format!(
                "argument '{}' must be one of [{}], got '{}'",
                spec.name,
                spec.allowed.join(", "),
                value
            )));
        }
        resolved.insert(spec.name.to_string(), Value::String(value.to_string()));
    }

    Ok(resolved)
}

/// Ordered collection of prompt templates.
pub struct PromptRegistry {
    prompts: Vec<Box<dyn PromptTemplate>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self { prompts: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AnswerFromDocs));
        registry.register(Box::new(WriteMdxSnippet));
        registry
    }

    pub fn register(&mut self, prompt: Box<dyn PromptTemplate>) {
        self.prompts.push(prompt);
    }

    pub fn prompts(&self) -> &[Box<dyn PromptTemplate>] {
        &self.prompts
    }

    pub fn find(&self, name: &str) -> Option<&dyn PromptTemplate> {
        self.prompts
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Look up, validate and render a prompt.
    pub fn render(
        &self,
        name: &str,
        args: Option<&Map<String, Value>>,
    ) -> Result<RenderedPrompt, ToolError> {
        let prompt = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownPrompt(name.to_string()))?;
        let resolved = resolve_arguments(&prompt.arguments(), args)?;
        Ok(RenderedPrompt {
            description: prompt.description().to_string(),
            text: prompt.render(&resolved),
        })
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}
