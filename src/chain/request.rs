//! Structured API calls synthesized by the model
//!
//! The request synthesizer asks the model for a `{url, method, body}` triple in
//! one of two wire formats, chosen per chain:
//!
//! - [`WireFormat::Json`]: a single JSON object with exactly the keys
//!   `api_url`, `request_method` and `request_body`
//! - [`WireFormat::PipeDelimited`]: one line `url|method|body`
//!
//! Models wrap their answers in code fences, bold markers, stray pipes and
//! newlines. All of that is stripped here, before the domain guard sees the
//! URL. Anything that still does not decompose into the expected shape is an
//! [`OutputParseError`] carrying the raw text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ChainError, OutputParseError};

/// Lowercase names of every method the chain can execute.
pub const SUPPORTED_HTTP_METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

/// HTTP verbs the executor knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "POST")]
    Post,
    #[serde(alias = "PUT")]
    Put,
    #[serde(alias = "PATCH")]
    Patch,
    #[serde(alias = "DELETE")]
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
        }
    }

    /// POST, PUT and PATCH send a JSON body. GET and DELETE never do.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = s.trim().to_ascii_lowercase();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == method)
            .ok_or(ChainError::UnsupportedMethod { method })
    }
}

/// Output contract of the request synthesizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Json,
    PipeDelimited,
}

/// A cleaned, parsed API call description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Possibly relative to the chain's base URL
    pub api_url: String,
    /// Lowercased and trimmed; validated against [`HttpMethod`] when executed
    pub request_method: String,
    pub request_body: Map<String, Value>,
}

impl ApiRequest {
    pub fn method(&self) -> Result<HttpMethod, ChainError> {
        self.request_method.parse()
    }

    /// Parse raw model output in the given wire format.
    pub fn parse(raw: &str, format: WireFormat) -> Result<Self, OutputParseError> {
        let (api_url, method, body) = match format {
            WireFormat::Json => split_json(raw)?,
            WireFormat::PipeDelimited => split_pipe(raw)?,
        };

        let api_url = clean_field(&api_url).replace('|', "");
        if api_url.is_empty() {
            return Err(OutputParseError::new("api_url is empty", raw));
        }

        let request_method = clean_field(&method).replace('|', "").to_ascii_lowercase();
        if request_method.is_empty() {
            return Err(OutputParseError::new("request_method is empty", raw));
        }

        let needs_body = request_method
            .parse::<HttpMethod>()
            .map(|m| m.carries_body())
            .unwrap_or(false);

        let request_body = match parse_body(body) {
            Ok(body) => body,
            Err(message) if needs_body => {
                return Err(OutputParseError::new(
                    format!("request_body for {request_method} is not a JSON object: {message}"),
                    raw,
                ))
            }
            // GET and DELETE never send a body
            Err(_) => Map::new(),
        };

        Ok(Self {
            api_url,
            request_method,
            request_body,
        })
    }
}

/// Body as it came out of the model, before JSON validation
enum RawBody {
    Text(String),
    Value(Value),
}

fn parse_body(body: RawBody) -> Result<Map<String, Value>, String> {
    let value = match body {
        RawBody::Value(value) => value,
        RawBody::Text(text) => {
            let text = text.trim().trim_matches('|').trim();
            if text.is_empty() {
                return Err("request_body is empty".to_string());
            }
            serde_json::from_str::<Value>(text).map_err(|e| e.to_string())?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err("request_body is null".to_string()),
        Value::String(text) => parse_body(RawBody::Text(text)),
        other => Err(format!("expected an object, got {other}")),
    }
}

/// Remove newlines, markdown bold markers and surrounding whitespace/pipes.
fn clean_field(field: &str) -> String {
    let field = field.replace('\n', "").replace('\r', "").replace("**", "");
    field.trim().trim_matches('|').trim().to_string()
}

fn split_pipe(raw: &str) -> Result<(String, String, RawBody), OutputParseError> {
    let line = raw.replace("**", "");
    let line = line.trim().trim_matches('|');
    let parts: Vec<&str> = line.splitn(3, '|').collect();

    match parts.as_slice() {
        [url, method, body] => Ok((url.to_string(), method.to_string(), RawBody::Text(body.to_string()))),
        _ => Err(OutputParseError::new(
            "expected `api_url|request_method|request_body`",
            raw,
        )),
    }
}

const EXPECTED_KEYS: [&str; 3] = ["api_url", "request_method", "request_body"];

fn split_json(raw: &str) -> Result<(String, String, RawBody), OutputParseError> {
    let text = strip_code_fence(raw);
    let object = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => map,
        _ => first_json_object(text)
            .ok_or_else(|| OutputParseError::new("no JSON object found in model output", raw))?,
    };

    let missing: Vec<&str> = EXPECTED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(OutputParseError::new(
            format!("missing keys: {}", missing.join(", ")),
            raw,
        ));
    }

    let unexpected: Vec<&str> = object
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !EXPECTED_KEYS.contains(k))
        .collect();
    if !unexpected.is_empty() {
        return Err(OutputParseError::new(
            format!("unexpected keys: {}", unexpected.join(", ")),
            raw,
        ));
    }

    let api_url = string_field(&object, "api_url", raw)?;
    let method = string_field(&object, "request_method", raw)?;
    let body = match object.get("request_body").cloned().unwrap_or(Value::Null) {
        Value::String(s) => RawBody::Text(s),
        value => RawBody::Value(value),
    };

    Ok((api_url, method, body))
}

fn string_field(object: &Map<String, Value>, key: &str, raw: &str) -> Result<String, OutputParseError> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(OutputParseError::new(
            format!("{key} must be a string, got {other}"),
            raw,
        )),
        None => Err(OutputParseError::new(format!("missing keys: {key}"), raw)),
    }
}

/// Return the body of the first fenced block, or the input unchanged.
fn strip_code_fence(raw: &str) -> &str {
    let Some(start) = raw.find("```") else {
        return raw;
    };
    let after = &raw[start + 3..];
    // Skip a language tag such as ```json
    let after = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => &after[..end],
        None => after,
    }
}

/// Find the first `{...}` that balances and parses as a JSON object.
///
/// Every `{` is tried as a start, so an unclosed brace in surrounding prose
/// does not hide an object that follows it.
fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let end = balanced_end(&text[start..])?;
        match serde_json::from_str::<Value>(&text[start..start + end]) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    })
}

/// Byte length of the brace-balanced prefix of `text`, which starts with `{`.
/// Braces inside JSON strings are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Join a relative API path onto a base URL.
///
/// At most one slash is trimmed on each side of the join point so the result
/// has exactly one separator.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base}/{path}")
}
