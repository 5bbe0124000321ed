//! Prompt templates
//!
//! Templates use `{name}` placeholders. Literal braces are written doubled
//! (`{{` and `}}`), which is what lets the request prompt show the model a JSON
//! skeleton. The set of placeholders is parsed once when the template is
//! created so chains can validate the variables a prompt expects before the
//! first call.

use std::collections::BTreeSet;

/// A parsed prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    variables: BTreeSet<String>,
}

/// One lexical piece of a template
enum Piece<'a> {
    Text(&'a str),
    Brace(char),
    Var(&'a str),
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Split a template into text, escaped braces and placeholders.
fn pieces(template: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut rest = template;

    while !rest.is_empty() {
        let Some(idx) = rest.find(&['{', '}'][..]) else {
            out.push(Piece::Text(rest));
            break;
        };
        if idx > 0 {
            out.push(Piece::Text(&rest[..idx]));
        }
        let tail = &rest[idx..];

        if tail.starts_with("{{") {
            out.push(Piece::Brace('{'));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push(Piece::Brace('}'));
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail[1..].find('}') {
                Some(end) if is_identifier(&tail[1..1 + end]) => {
                    out.push(Piece::Var(&tail[1..1 + end]));
                    rest = &tail[end + 2..];
                }
                _ => {
                    out.push(Piece::Text(&tail[..1]));
                    rest = &tail[1..];
                }
            }
        } else {
            out.push(Piece::Text(&tail[..1]));
            rest = &tail[1..];
        }
    }

    out
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = pieces(&template)
            .into_iter()
            .filter_map(|piece| match piece {
                Piece::Var(name) => Some(name.to_string()),
                _ => None,
            })
            .collect();
        Self { template, variables }
    }

    /// Placeholder names that appear in the template.
    pub fn input_variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    /// True when the template's placeholders are exactly `expected`.
    pub fn expects_exactly(&self, expected: &[&str]) -> bool {
        let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
        self.variables == expected
    }

    /// Substitute placeholders. Unknown placeholders are left as written.
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len());
        for piece in pieces(&self.template) {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Brace(c) => out.push(c),
                Piece::Var(name) => match values.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Request synthesis prompt for the JSON wire format
pub const API_REQUEST_PROMPT_JSON: &str = r#"
Given below API Documentation,
your task is to construct the most efficient API URL to answer
the user's question, ensuring the call is optimized to include only necessary information.
If a parameter is not required and doesn't have a default value, exclude it from the API URL
unless it's directly relevant to the user's question. Ensure that no parameter is included
as an empty value.
You MUST extract the API URL, request METHOD and generate the BODY data in JSON format
according to the user question if necessary.
The parameters' names and BODY data keys MUST be obtained from the provided context.
Do NOT make up parameters' names.
The BODY data can be an empty JSON.
Respond in valid json only in the below format and do NOT give any explanation.

{{
    "api_url": "",
    "request_method": "",
    "request_body": {{}}
}}

API Documentation:
{api_docs}

Question:
{question}

Output:
"#;

/// Request synthesis prompt for the pipe-delimited wire format
pub const API_REQUEST_PROMPT_PIPE: &str = r#"
Given below API Documentation,
your task is to construct the most efficient API call to answer the user's question.
Only include parameters that are required or directly relevant to the question.
The parameters' names and BODY data keys MUST be obtained from the provided context.
Do NOT make up parameters' names.
Respond with exactly one line in the format

api_url|request_method|request_body

where request_method is one of GET, POST, PUT, PATCH, DELETE and request_body is
a JSON object (use {{}} when no body is needed). Do NOT give any explanation.

API Documentation:
{api_docs}

Question:
{question}

Output:
"#;

/// Response synthesis prompt
pub const API_RESPONSE_PROMPT: &str = r#"
With the following official API Documentation: {api_docs}
and the specific user question: {question} in mind,
and given this API URL: {api_url} for querying, here is the
response from the API: {api_response}.
Do NOT include technical details like response format.
Do NOT include any thoughts or internal processes.
You MUST provide a clear, relevant and concise answer.

Response:
"#;

/// Supervisor routing prompt
pub const SUPERVISOR_PROMPT: &str = r#"
You are a supervisor tasked with routing a query to one of the following workers: {workers}.
Given the following user request, respond with the worker to act next. Each worker will perform a task
and respond with their results and status. The worker output will be returned to the user.
The options for workers are {workers}. Return 'end' if the request isn't related to any of the given workers.

User request: {question}

Respond in JSON format with a single key "next" which holds the worker name.

next :
"#;
