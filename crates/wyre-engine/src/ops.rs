//! Pure node operations.
//!
//! Every operation is a deterministic function of its resolved inputs (and,
//! for `get_variable`, the run's variables). Inputs arrive already coerced to
//! the kinds declared by `PureOp::inputs`.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wyre_core::error::{Result, WyreError};
use wyre_core::types::PinKind;

use crate::coerce::{coerce, lenient_number, number_value, text_of, truthy};
use crate::graph::PinDef;

/// Output values of one evaluation, keyed by pin name.
pub type Outputs = HashMap<String, Value>;

/// A side-effect-free computation hosted by a `pure` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum PureOp {
    Literal {
        value_kind: PinKind,
        #[serde(default)]
        value: Value,
    },
    Math {
        op: MathOp,
    },
    Compare {
        op: CompareOp,
    },
    #[serde(rename = "string")]
    Text {
        op: TextOp,
    },
    #[serde(rename = "array")]
    List {
        op: ListOp,
    },
    JsonParse,
    JsonPath {
        #[serde(default)]
        default_path: String,
    },
    Convert {
        target: PinKind,
    },
    PromptBuilder {
        #[serde(default = "default_prompt_layout")]
        template: String,
    },
    GetVariable {
        name: String,
    },
    ParseResponse {
        #[serde(default)]
        mode: ParseMode,
    },
}

fn default_prompt_layout() -> String {
    "{system}\n\n{user}\n\n{context}".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MathOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "pow")]
    Pow,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOp {
    Trim,
    Upper,
    Lower,
    /// `param` is `old->new`.
    Replace,
    /// Split on `param`, or on whitespace when it is empty.
    Split,
    /// Join the lines of `text` with `param`.
    Join,
    /// `param` with `{text}` substituted.
    Format,
    /// First match of the `param` pattern.
    Regex,
    /// `param` is `start,end` in characters.
    Substring,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOp {
    Push,
    Pop,
    Length,
    Find,
    Filter,
    /// `item` is `start,end`.
    Slice,
    Sort,
    Reverse,
    Flatten,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    #[default]
    Json,
    Regex,
    Split,
}

impl PureOp {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Literal { .. } => "literal",
            Self::Math { .. } => "math",
            Self::Compare { .. } => "compare",
            Self::Text { .. } => "string",
            Self::List { .. } => "array",
            Self::JsonParse => "json_parse",
            Self::JsonPath { .. } => "json_path",
            Self::Convert { .. } => "convert",
            Self::PromptBuilder { .. } => "prompt_builder",
            Self::GetVariable { .. } => "get_variable",
            Self::ParseResponse { .. } => "parse_response",
        }
    }

    pub fn inputs(&self) -> Vec<PinDef> {
        match self {
            Self::Literal { .. } | Self::GetVariable { .. } => vec![],
            Self::Math { .. } => vec![
                PinDef::new("a", PinKind::Number),
                PinDef::new("b", PinKind::Number),
            ],
            Self::Compare { .. } => vec![
                PinDef::new("a", PinKind::Any),
                PinDef::new("b", PinKind::Any),
            ],
            Self::Text { .. } => vec![
                PinDef::new("text", PinKind::String),
                PinDef::new("param", PinKind::String),
            ],
            Self::List { .. } => vec![
                PinDef::new("array", PinKind::Array),
                PinDef::new("item", PinKind::Any),
            ],
            Self::JsonParse => vec![PinDef::new("text", PinKind::String)],
            Self::JsonPath { .. } => vec![
                PinDef::new("object", PinKind::Any),
                PinDef::new("path", PinKind::String),
            ],
            Self::Convert { .. } => vec![PinDef::new("input", PinKind::Any)],
            Self::PromptBuilder { .. } => vec![
                PinDef::new("system", PinKind::String),
                PinDef::new("user", PinKind::String),
                PinDef::new("context", PinKind::String),
            ],
            Self::ParseResponse { .. } => vec![
                PinDef::new("text", PinKind::String),
                PinDef::new("pattern", PinKind::String),
            ],
        }
    }

    pub fn outputs(&self) -> Vec<PinDef> {
        match self {
            Self::Literal { value_kind, .. } => vec![PinDef::new("value", *value_kind)],
            Self::Math { .. } => vec![PinDef::new("result", PinKind::Number)],
            Self::Compare { .. } => vec![PinDef::new("result", PinKind::Boolean)],
            Self::Text { op } => {
                let kind = match op {
                    TextOp::Split => PinKind::Array,
                    TextOp::Length => PinKind::Number,
                    _ => PinKind::String,
                };
                vec![PinDef::new("result", kind)]
            }
            Self::List { .. } => vec![
                PinDef::new("result", PinKind::Array),
                PinDef::new("element", PinKind::Any),
            ],
            Self::JsonParse => vec![PinDef::new("object", PinKind::Any)],
            Self::JsonPath { .. } => vec![PinDef::new("value", PinKind::Any)],
            Self::Convert { target } => vec![PinDef::new("output", *target)],
            Self::PromptBuilder { .. } => vec![PinDef::new("prompt", PinKind::String)],
            Self::GetVariable { .. } => vec![PinDef::new("value", PinKind::Any)],
            Self::ParseResponse { .. } => vec![
                PinDef::new("parsed", PinKind::Any),
                PinDef::new("items", PinKind::Array),
            ],
        }
    }

    /// Compute this operation's outputs.
    pub fn evaluate(
        &self,
        node_id: &str,
        inputs: &HashMap<String, Value>,
        variables: &HashMap<String, Value>,
    ) -> Result<Outputs> {
        let input = |name: &str| inputs.get(name).cloned().unwrap_or(Value::Null);
        let text = |name: &str| inputs.get(name).map(text_of).unwrap_or_default();

        let outputs = match self {
            Self::Literal { value_kind, value } => {
                let value = match value {
                    Value::String(s) if s.is_empty() => value_kind.zero_value(),
                    v => coerce(v.clone(), PinKind::Any, *value_kind)?,
                };
                single("value", value)
            }
            Self::Math { op } => {
                let a = lenient_number(&input("a"));
                let b = lenient_number(&input("b"));
                let result = math(*op, a, b);
                if !result.is_finite() {
                    return Err(WyreError::node(
                        node_id,
                        format!("math result is not finite ({a} {op:?} {b})"),
                    ));
                }
                single("result", number_value(result))
            }
            Self::Compare { op } => {
                single("result", Value::Bool(compare(*op, &input("a"), &input("b"))))
            }
            Self::Text { op } => single("result", text_op(*op, &text("text"), &text("param"))),
            Self::List { op } => {
                let array = match input("array") {
                    Value::Array(items) => items,
                    _ => vec![],
                };
                let (result, element) = list_op(*op, array, input("item"));
                let mut out = single("result", Value::Array(result));
                out.insert("element".into(), element);
                out
            }
            Self::JsonParse => {
                let parsed = serde_json::from_str(&text("text"))
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                single("object", parsed)
            }
            Self::JsonPath { default_path } => {
                let mut path = text("path");
                if path.is_empty() {
                    path = default_path.clone();
                }
                let object = match input("object") {
                    Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::Null),
                    other => other,
                };
                single("value", walk_path(&object, &path))
            }
            Self::Convert { target } => single("output", convert(input("input"), *target)),
            Self::PromptBuilder { template } => {
                let prompt = template
                    .replace("{system}", &text("system"))
                    .replace("{user}", &text("user"))
                    .replace("{context}", &text("context"));
                single("prompt", Value::String(prompt.trim().to_string()))
            }
            Self::GetVariable { name } => {
                single("value", variables.get(name).cloned().unwrap_or(Value::Null))
            }
            Self::ParseResponse { mode } => {
                let (parsed, items) = parse_response(*mode, &text("text"), &text("pattern"));
                let mut out = single("parsed", parsed);
                out.insert("items".into(), Value::Array(items));
                out
            }
        };
        Ok(outputs)
    }
}

fn single(pin: &str, value: Value) -> Outputs {
    let mut out = HashMap::new();
    out.insert(pin.to_string(), value);
    out
}

fn math(op: MathOp, a: f64, b: f64) -> f64 {
    match op {
        MathOp::Add => a + b,
        MathOp::Sub => a - b,
        MathOp::Mul => a * b,
        MathOp::Div if b == 0.0 => 0.0,
        MathOp::Div => a / b,
        MathOp::Rem if b == 0.0 => 0.0,
        MathOp::Rem => a - b * (a / b).floor(),
        MathOp::Pow => a.powf(b),
        MathOp::Min => a.min(b),
        MathOp::Max => a.max(b),
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    let a_text = text_of(a);
    let b_text = text_of(b);
    match op {
        CompareOp::Eq => a_text == b_text,
        CompareOp::Ne => a_text != b_text,
        CompareOp::Lt => lenient_number(a) < lenient_number(b),
        CompareOp::Gt => lenient_number(a) > lenient_number(b),
        CompareOp::Le => lenient_number(a) <= lenient_number(b),
        CompareOp::Ge => lenient_number(a) >= lenient_number(b),
        CompareOp::Contains => a_text.to_lowercase().contains(&b_text.to_lowercase()),
        CompareOp::StartsWith => a_text.to_lowercase().starts_with(&b_text.to_lowercase()),
        CompareOp::EndsWith => a_text.to_lowercase().ends_with(&b_text.to_lowercase()),
    }
}

fn text_op(op: TextOp, text: &str, param: &str) -> Value {
    match op {
        TextOp::Trim => Value::String(text.trim().to_string()),
        TextOp::Upper => Value::String(text.to_uppercase()),
        TextOp::Lower => Value::String(text.to_lowercase()),
        TextOp::Replace => {
            let (old, new) = param.split_once("->").unwrap_or((param, ""));
            if old.is_empty() {
                Value::String(text.to_string())
            } else {
                Value::String(text.replace(old, new))
            }
        }
        TextOp::Split => {
            let parts: Vec<Value> = if param.is_empty() {
                text.split_whitespace().map(|s| Value::String(s.into())).collect()
            } else {
                text.split(param).map(|s| Value::String(s.into())).collect()
            };
            Value::Array(parts)
        }
        TextOp::Join => Value::String(text.split('\n').collect::<Vec<_>>().join(param)),
        TextOp::Format => Value::String(param.replace("{text}", text)),
        TextOp::Regex => Value::String(
            regex_matches(param, text)
                .into_iter()
                .next()
                .unwrap_or_default(),
        ),
        TextOp::Substring => Value::String(substring(text, param)),
        TextOp::Length => Value::from(text.chars().count() as u64),
    }
}

/// All matches of `pattern`, taking the first capture group when there is one.
/// An invalid pattern matches nothing.
fn regex_matches(pattern: &str, text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(pattern) else {
        return vec![];
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn substring(text: &str, range: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = range.split(',');
    let start = parts.next().map(str::trim).unwrap_or("0");
    let end = parts.next().map(str::trim);

    let (Ok(start), Ok(end)) = (
        start.parse::<i64>(),
        end.map(|e| e.parse::<i64>()).unwrap_or(Ok(chars.len() as i64)),
    ) else {
        return text.to_string();
    };
    let (start, end) = slice_bounds(start, end, chars.len());
    chars[start..end].iter().collect()
}

/// Clamp possibly negative `start..end` indices to `0..=len`, with negative
/// values counting from the end.
fn slice_bounds(start: i64, end: i64, len: usize) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { len as i64 + i } else { i };
        i.clamp(0, len as i64) as usize
    };
    let (start, end) = (clamp(start), clamp(end));
    (start, end.max(start))
}

fn list_op(op: ListOp, mut array: Vec<Value>, item: Value) -> (Vec<Value>, Value) {
    let mut element = Value::Null;
    match op {
        ListOp::Push => array.push(item),
        ListOp::Pop => element = array.pop().unwrap_or(Value::Null),
        ListOp::Length => element = Value::from(array.len() as u64),
        ListOp::Find => {
            element = array
                .iter()
                .find(|x| **x == item)
                .cloned()
                .unwrap_or(Value::Null)
        }
        ListOp::Filter => array.retain(|x| !x.is_null() && !text_of(x).trim().is_empty()),
        ListOp::Slice => {
            let range = text_of(&item);
            let mut parts = range.split(',').map(str::trim);
            let start = parts.next().unwrap_or("0");
            let end = parts.next();
            if let (Ok(start), Ok(end)) = (
                if start.is_empty() { Ok(0) } else { start.parse::<i64>() },
                end.map(|e| e.parse::<i64>()).unwrap_or(Ok(array.len() as i64)),
            ) {
                let (start, end) = slice_bounds(start, end, array.len());
                array = array[start..end].to_vec();
            }
        }
        ListOp::Sort => array.sort_by_key(text_of),
        ListOp::Reverse => array.reverse(),
        ListOp::Flatten => {
            array = array
                .into_iter()
                .flat_map(|x| match x {
                    Value::Array(inner) => inner,
                    other => vec![other],
                })
                .collect()
        }
    }
    (array, element)
}

/// Dot-separated lookup: `key.0.name`. Missing segments give `null`.
fn walk_path(value: &Value, path: &str) -> Value {
    let mut current = value;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Explicit conversion. Unlike pin coercion this never fails: values that
/// have no strict conversion are wrapped or read leniently.
fn convert(input: Value, target: PinKind) -> Value {
    if let Ok(v) = coerce(input.clone(), PinKind::Any, target) {
        return v;
    }
    match target {
        PinKind::Number => number_value(lenient_number(&input)),
        PinKind::Boolean => Value::Bool(truthy(&input)),
        PinKind::String => Value::String(text_of(&input)),
        PinKind::Array => {
            let parsed = input
                .as_str()
                .and_then(|s| serde_json::from_str::<Value>(s).ok());
            Value::Array(vec![parsed.unwrap_or(input)])
        }
        PinKind::Object => {
            let mut map = Map::new();
            map.insert("value".into(), input);
            Value::Object(map)
        }
        PinKind::Any => input,
    }
}

fn parse_response(mode: ParseMode, text: &str, pattern: &str) -> (Value, Vec<Value>) {
    match mode {
        ParseMode::Json => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => (Value::Array(items.clone()), items),
            Ok(Value::Object(map)) => {
                let items = map.values().cloned().collect();
                (Value::Object(map), items)
            }
            Ok(other) => (other, vec![]),
            Err(_) => (Value::String(text.to_string()), vec![]),
        },
        ParseMode::Regex => {
            let matches: Vec<Value> = regex_matches(pattern, text)
                .into_iter()
                .map(Value::String)
                .collect();
            let first = matches.first().cloned().unwrap_or(Value::String(String::new()));
            (first, matches)
        }
        ParseMode::Split => {
            let delimiter = if pattern.is_empty() { "\n" } else { pattern };
            let items: Vec<Value> = text
                .split(delimiter)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            let first = items.first().cloned().unwrap_or(Value::String(String::new()));
            (first, items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(op: &PureOp, inputs: Value) -> Outputs {
        let inputs: HashMap<String, Value> = serde_json::from_value(inputs).unwrap();
        op.evaluate("n", &inputs, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_math_ops() {
        let add = PureOp::Math { op: MathOp::Add };
        assert_eq!(run(&add, json!({"a": 2, "b": 3}))["result"], json!(5));
        let div = PureOp::Math { op: MathOp::Div };
        assert_eq!(run(&div, json!({"a": 1, "b": 0}))["result"], json!(0));
        assert_eq!(run(&div, json!({"a": 1, "b": 4}))["result"], json!(0.25));
        let rem = PureOp::Math { op: MathOp::Rem };
        assert_eq!(run(&rem, json!({"a": 7, "b": 3}))["result"], json!(1));
    }

    #[test]
    fn test_math_overflow_is_node_error() {
        let pow = PureOp::Math { op: MathOp::Pow };
        let inputs: HashMap<String, Value> =
            serde_json::from_value(json!({"a": 10, "b": 400})).unwrap();
        let err = pow.evaluate("p", &inputs, &HashMap::new()).unwrap_err();
        assert!(matches!(err, WyreError::NodeExecution { ref node, .. } if node == "p"));
    }

    #[test]
    fn test_compare_ops() {
        let eq = PureOp::Compare { op: CompareOp::Eq };
        assert_eq!(run(&eq, json!({"a": 3, "b": "3"}))["result"], json!(true));
        let lt = PureOp::Compare { op: CompareOp::Lt };
        assert_eq!(run(&lt, json!({"a": "2", "b": 10}))["result"], json!(true));
        let contains = PureOp::Compare {
            op: CompareOp::Contains,
        };
        assert_eq!(
            run(&contains, json!({"a": "Hello World", "b": "WORLD"}))["result"],
            json!(true)
        );
    }

    #[test]
    fn test_text_ops() {
        let replace = PureOp::Text { op: TextOp::Replace };
        assert_eq!(
            run(&replace, json!({"text": "a-b-c", "param": "-->+"}))["result"],
            json!("a+b+c")
        );
        let split = PureOp::Text { op: TextOp::Split };
        assert_eq!(
            run(&split, json!({"text": "x y  z", "param": ""}))["result"],
            json!(["x", "y", "z"])
        );
        let regex = PureOp::Text { op: TextOp::Regex };
        assert_eq!(
            run(&regex, json!({"text": "id=42;", "param": r"id=(\d+)"}))["result"],
            json!("42")
        );
        assert_eq!(
            run(&regex, json!({"text": "abc", "param": "("}))["result"],
            json!("")
        );
        let sub = PureOp::Text {
            op: TextOp::Substring,
        };
        assert_eq!(
            run(&sub, json!({"text": "blueprint", "param": "0,4"}))["result"],
            json!("blue")
        );
        let len = PureOp::Text { op: TextOp::Length };
        assert_eq!(run(&len, json!({"text": "héllo"}))["result"], json!(5));
    }

    #[test]
    fn test_list_ops() {
        let pop = PureOp::List { op: ListOp::Pop };
        let out = run(&pop, json!({"array": [1, 2, 3]}));
        assert_eq!(out["result"], json!([1, 2]));
        assert_eq!(out["element"], json!(3));

        let filter = PureOp::List { op: ListOp::Filter };
        assert_eq!(
            run(&filter, json!({"array": ["a", null, " ", "b"]}))["result"],
            json!(["a", "b"])
        );

        let slice = PureOp::List { op: ListOp::Slice };
        assert_eq!(
            run(&slice, json!({"array": [1, 2, 3, 4], "item": "1,3"}))["result"],
            json!([2, 3])
        );

        let flatten = PureOp::List { op: ListOp::Flatten };
        assert_eq!(
            run(&flatten, json!({"array": [[1, 2], 3, [4]]}))["result"],
            json!([1, 2, 3, 4])
        );
    }

    #[test]
    fn test_json_path_walks_objects_and_arrays() {
        let op = PureOp::JsonPath {
            default_path: "items.1.name".into(),
        };
        let doc = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(run(&op, json!({"object": doc, "path": ""}))["value"], json!("b"));
        assert_eq!(
            run(&op, json!({"object": "{\"k\": 1}", "path": "k"}))["value"],
            json!(1)
        );
        assert_eq!(
            run(&op, json!({"object": {"k": 1}, "path": "missing.x"}))["value"],
            Value::Null
        );
    }

    #[test]
    fn test_convert_is_lenient() {
        let to_array = PureOp::Convert {
            target: PinKind::Array,
        };
        assert_eq!(run(&to_array, json!({"input": "plain"}))["output"], json!(["plain"]));
        assert_eq!(run(&to_array, json!({"input": "[1]"}))["output"], json!([1]));
        let to_object = PureOp::Convert {
            target: PinKind::Object,
        };
        assert_eq!(
            run(&to_object, json!({"input": 5}))["output"],
            json!({"value": 5})
        );
        let to_number = PureOp::Convert {
            target: PinKind::Number,
        };
        assert_eq!(run(&to_number, json!({"input": "n/a"}))["output"], json!(0));
    }

    #[test]
    fn test_prompt_builder_and_variables() {
        let builder = PureOp::PromptBuilder {
            template: default_prompt_layout(),
        };
        assert_eq!(
            run(&builder, json!({"system": "", "user": "hi", "context": ""}))["prompt"],
            json!("hi")
        );

        let get = PureOp::GetVariable { name: "x".into() };
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), json!([1]));
        let out = get.evaluate("g", &HashMap::new(), &vars).unwrap();
        assert_eq!(out["value"], json!([1]));
    }

    #[test]
    fn test_parse_response_modes() {
        let json_mode = PureOp::ParseResponse {
            mode: ParseMode::Json,
        };
        let out = run(&json_mode, json!({"text": "{\"a\": 1, \"b\": 2}"}));
        assert_eq!(out["items"], json!([1, 2]));
        let out = run(&json_mode, json!({"text": "not json"}));
        assert_eq!(out["parsed"], json!("not json"));

        let split = PureOp::ParseResponse {
            mode: ParseMode::Split,
        };
        let out = run(&split, json!({"text": "a\n\n b \nc", "pattern": ""}));
        assert_eq!(out["items"], json!(["a", "b", "c"]));
        assert_eq!(out["parsed"], json!("a"));
    }

    #[test]
    fn test_literal_coerces_to_declared_kind() {
        let lit = PureOp::Literal {
            value_kind: PinKind::Array,
            value: json!("[1, 2]"),
        };
        assert_eq!(run(&lit, json!({}))["value"], json!([1, 2]));
        let bad = PureOp::Literal {
            value_kind: PinKind::Number,
            value: json!("abc"),
        };
        assert!(bad.evaluate("l", &HashMap::new(), &HashMap::new()).is_err());
    }

    #[test]
    fn test_op_deserializes_from_tagged_json() {
        let op: PureOp = serde_json::from_str(r#"{"function": "math", "op": "*"}"#).unwrap();
        assert!(matches!(op, PureOp::Math { op: MathOp::Mul }));
        let op: PureOp = serde_json::from_str(r#"{"function": "string", "op": "upper"}"#).unwrap();
        assert_eq!(op.name(), "string");
    }
}
