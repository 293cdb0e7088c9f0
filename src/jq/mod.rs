//! A small jq-compatible query engine for `--jq`.

mod parser;

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{CliError, DEFAULT_HALT_EXIT_CODE};

use self::parser::{CompareOp, Filter, ObjectKey};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JqError {
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    /// `halt` and `halt_error` stop the program with an exit code.
    #[error("halted with exit code {code}")]
    Halt { code: i32, message: Option<String> },
}

impl From<JqError> for CliError {
    fn from(error: JqError) -> Self {
        match error {
            JqError::Halt { code, message } => Self::Halt {
                code,
                value: message,
                output: String::new(),
            },
            other => Self::Input(format!("jq: {other}")),
        }
    }
}

/// A compiled query.
#[derive(Debug, Clone)]
pub struct Query {
    filter: Filter,
}

impl Query {
    pub fn compile(source: &str) -> Result<Self, JqError> {
        parser::parse(source).map(|filter| Self { filter })
    }

    pub fn run(&self, input: &Value) -> Result<Vec<Value>, JqError> {
        eval(&self.filter, input)
    }

    /// Runs the query and renders its outputs, one per line.
    ///
    /// Strings, numbers, booleans, and null are printed raw. Arrays and objects
    /// are printed as compact JSON.
    pub fn render(&self, input: &Value) -> Result<String, JqError> {
        let mut rendered = String::new();
        self.render_into(input, &mut rendered)?;
        Ok(rendered)
    }

    /// Like [`Query::render`], appending to `out` as outputs are produced.
    ///
    /// On a halt `out` keeps every line printed before it.
    pub fn render_into(&self, input: &Value, out: &mut String) -> Result<(), JqError> {
        stream(&self.filter, input, &mut |value| {
            out.push_str(&raw_or_compact(&value));
            out.push('\n');
            Ok(())
        })
    }
}

type Emit<'a> = dyn FnMut(Value) -> Result<(), JqError> + 'a;

/// Evaluates `filter` output by output, so a later error leaves earlier outputs emitted.
fn stream(filter: &Filter, input: &Value, emit: &mut Emit<'_>) -> Result<(), JqError> {
    match filter {
        Filter::Pipe(left, right) => {
            stream(left, input, &mut |value| stream(right, &value, &mut *emit))
        }
        Filter::Comma(left, right) => {
            stream(left, input, &mut *emit)?;
            stream(right, input, emit)
        }
        Filter::Iterate(target) => stream(target, input, &mut |value| match value {
            Value::Array(items) => items.into_iter().try_for_each(&mut *emit),
            Value::Object(entries) => entries.into_iter().try_for_each(|(_, v)| emit(v)),
            other => Err(JqError::Runtime(format!(
                "Cannot iterate over {}",
                type_name(&other)
            ))),
        }),
        other => eval(other, input)?.into_iter().try_for_each(emit),
    }
}

fn raw_or_compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn eval(filter: &Filter, input: &Value) -> Result<Vec<Value>, JqError> {
    match filter {
        Filter::Identity => Ok(vec![input.clone()]),
        Filter::Literal(value) => Ok(vec![value.clone()]),
        Filter::Field { target, name } => eval(target, input)?
            .iter()
            .map(|value| field(value, name))
            .collect(),
        Filter::Index { target, index } => {
            let mut out = Vec::new();
            for value in eval(target, input)? {
                for key in eval(index, input)? {
                    out.push(index_value(&value, &key)?);
                }
            }
            Ok(out)
        }
        Filter::Iterate(target) => {
            let mut out = Vec::new();
            for value in eval(target, input)? {
                match value {
                    Value::Array(items) => out.extend(items),
                    Value::Object(entries) => out.extend(entries.into_iter().map(|(_, v)| v)),
                    other => {
                        return Err(JqError::Runtime(format!(
                            "Cannot iterate over {}",
                            type_name(&other)
                        )));
                    }
                }
            }
            Ok(out)
        }
        Filter::Try(inner) => match eval(inner, input) {
            Ok(values) => Ok(values),
            Err(halt @ JqError::Halt { .. }) => Err(halt),
            Err(_) => Ok(Vec::new()),
        },
        Filter::Pipe(left, right) => {
            let mut out = Vec::new();
            for value in eval(left, input)? {
                out.extend(eval(right, &value)?);
            }
            Ok(out)
        }
        Filter::Comma(left, right) => {
            let mut out = eval(left, input)?;
            out.extend(eval(right, input)?);
            Ok(out)
        }
        Filter::Compare(op, left, right) => {
            let mut out = Vec::new();
            for r in eval(right, input)? {
                for l in eval(left, input)? {
                    let ordering = compare(&l, &r);
                    let result = match op {
                        CompareOp::Eq => ordering == Ordering::Equal,
                        CompareOp::Ne => ordering != Ordering::Equal,
                        CompareOp::Lt => ordering == Ordering::Less,
                        CompareOp::Le => ordering != Ordering::Greater,
                        CompareOp::Gt => ordering == Ordering::Greater,
                        CompareOp::Ge => ordering != Ordering::Less,
                    };
                    out.push(Value::Bool(result));
                }
            }
            Ok(out)
        }
        Filter::And(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if !truthy(&l) {
                    out.push(Value::Bool(false));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(truthy(&r)));
                }
            }
            Ok(out)
        }
        Filter::Or(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if truthy(&l) {
                    out.push(Value::Bool(true));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(truthy(&r)));
                }
            }
            Ok(out)
        }
        Filter::Call(name, args) => call(name, args, input),
        Filter::Array(None) => Ok(vec![Value::Array(Vec::new())]),
        Filter::Array(Some(inner)) => Ok(vec![Value::Array(eval(inner, input)?)]),
        Filter::Object(entries) => {
            let mut objects = vec![Map::new()];
            for (key, value) in entries {
                let keys = match key {
                    ObjectKey::Literal(name) => vec![name.clone()],
                    ObjectKey::Computed(filter) => eval(filter, input)?
                        .into_iter()
                        .map(|key| match key {
                            Value::String(text) => Ok(text),
                            other => Err(JqError::Runtime(format!(
                                "Object keys must be strings, not {}",
                                type_name(&other)
                            ))),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                };
                let values = eval(value, input)?;

                let mut expanded = Vec::new();
                for object in &objects {
                    for key in &keys {
                        for value in &values {
                            let mut object = object.clone();
                            object.insert(key.clone(), value.clone());
                            expanded.push(object);
                        }
                    }
                }
                objects = expanded;
            }
            Ok(objects.into_iter().map(Value::Object).collect())
        }
    }
}

fn field(value: &Value, name: &str) -> Result<Value, JqError> {
    match value {
        Value::Object(entries) => Ok(entries.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(JqError::Runtime(format!(
            "Cannot index {} with \"{name}\"",
            type_name(other)
        ))),
    }
}

fn index_value(value: &Value, key: &Value) -> Result<Value, JqError> {
    match (value, key) {
        (Value::Object(_) | Value::Null, Value::String(name)) => field(value, name),
        (Value::Array(items), Value::Number(number)) => {
            let Some(position) = number.as_f64().map(|n| n.floor() as i64) else {
                return Ok(Value::Null);
            };
            let position = if position < 0 {
                items.len() as i64 + position
            } else {
                position
            };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|position| items.get(position))
                .cloned()
                .unwrap_or(Value::Null))
        }
        (Value::Null, Value::Number(_)) => Ok(Value::Null),
        (value, key) => Err(JqError::Runtime(format!(
            "Cannot index {} with {}",
            type_name(value),
            type_name(key)
        ))),
    }
}

fn call(name: &str, args: &[Filter], input: &Value) -> Result<Vec<Value>, JqError> {
    match name {
        "empty" => Ok(Vec::new()),
        "not" => Ok(vec![Value::Bool(!truthy(input))]),
        "length" => {
            let length = match input {
                Value::Null => Value::from(0),
                Value::Bool(_) => {
                    return Err(JqError::Runtime("boolean has no length".to_string()));
                }
                Value::Number(number) => match number.as_i64() {
                    Some(integer) => Value::from(integer.abs()),
                    None => serde_json::Number::from_f64(number.as_f64().unwrap_or(0.0).abs())
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                },
                Value::String(text) => Value::from(text.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(entries) => Value::from(entries.len()),
            };
            Ok(vec![length])
        }
        "keys" => match input {
            Value::Object(entries) => {
                let mut keys = entries.keys().cloned().collect::<Vec<_>>();
                keys.sort();
                Ok(vec![Value::Array(
                    keys.into_iter().map(Value::String).collect(),
                )])
            }
            Value::Array(items) => Ok(vec![Value::Array(
                (0..items.len()).map(Value::from).collect(),
            )]),
            other => Err(JqError::Runtime(format!(
                "{} has no keys",
                type_name(other)
            ))),
        },
        "select" => {
            let mut out = Vec::new();
            for condition in eval(&args[0], input)? {
                if truthy(&condition) {
                    out.push(input.clone());
                }
            }
            Ok(out)
        }
        "map" => {
            let Value::Array(items) = input else {
                return Err(JqError::Runtime(format!(
                    "Cannot iterate over {}",
                    type_name(input)
                )));
            };
            let mut mapped = Vec::new();
            for item in items {
                mapped.extend(eval(&args[0], item)?);
            }
            Ok(vec![Value::Array(mapped)])
        }
        "halt" => Err(JqError::Halt {
            code: 0,
            message: None,
        }),
        "halt_error" => {
            let code = match args.first() {
                None => DEFAULT_HALT_EXIT_CODE,
                Some(filter) => {
                    let codes = eval(filter, input)?;
                    match codes.first().and_then(Value::as_i64) {
                        Some(code) => i32::try_from(code).unwrap_or(DEFAULT_HALT_EXIT_CODE),
                        None => {
                            return Err(JqError::Runtime(
                                "halt_error/1: number required".to_string(),
                            ));
                        }
                    }
                }
            };
            let message = match input {
                Value::String(text) => text.clone(),
                other => format!("{other}\n"),
            };
            Err(JqError::Halt {
                code,
                message: Some(message),
            })
        }
        other => Err(JqError::Runtime(format!("{other} is not defined"))),
    }
}

/// jq ordering: null < false < true < numbers < strings < arrays < objects.
fn compare(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let (l, r) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Array(l), Value::Array(r)) => {
            for (a, b) in l.iter().zip(r) {
                let ordering = compare(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            l.len().cmp(&r.len())
        }
        (Value::Object(l), Value::Object(r)) => {
            let mut l_keys = l.keys().collect::<Vec<_>>();
            let mut r_keys = r.keys().collect::<Vec<_>>();
            l_keys.sort();
            r_keys.sort();
            let by_keys = l_keys.cmp(&r_keys);
            if by_keys != Ordering::Equal {
                return by_keys;
            }
            for key in l_keys {
                let ordering = compare(&l[key], &r[key]);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        }
        _ => rank(left).cmp(&rank(right)),
    }
}
