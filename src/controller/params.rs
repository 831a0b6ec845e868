//! Positional argument extraction for controller actions.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, HttpError};
use crate::handler::Next;
use crate::request::Request;
use crate::responder::Responder;

/// Where a declared parameter takes its value from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamSource {
    Request,
    Response,
    Next,
    Path,
    Query,
    Body,
    Header,
    Cookie,
}

/// One positional parameter of a controller action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParameterDeclaration {
    pub source: ParamSource,
    pub name: Option<String>,
    pub index: usize,
}

impl ParameterDeclaration {
    pub fn new(source: ParamSource, index: usize) -> Self {
        Self { source, name: None, index }
    }

    pub fn named(source: ParamSource, name: impl Into<String>, index: usize) -> Self {
        Self { source, name: Some(name.into()), index }
    }
}

/// A single extracted argument.
#[derive(Clone)]
pub enum Arg {
    /// No parameter was declared at this position, or the named value is absent.
    Undefined,
    Request(Request),
    Response(Responder),
    Next(Next),
    Value(Value),
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Request(req) => f.debug_tuple("Request").field(&req.path()).finish(),
            Self::Response(_) => f.write_str("Response"),
            Self::Next(_) => f.write_str("Next"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// The positional arguments handed to a controller action.
#[derive(Clone, Debug, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, index: usize) -> &Arg {
        self.0.get(index).unwrap_or(&Arg::Undefined)
    }

    /// Deserializes the value at `index`.
    ///
    /// Undefined positions deserialize from `null`, so `Option<T>` accepts
    /// them. String values that do not fit `T` as-is are retried as JSON,
    /// which turns a path segment like `"42"` into a number.
    pub fn value<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = match self.get(index) {
            Arg::Value(v) => v.clone(),
            Arg::Undefined => Value::Null,
            other => {
                return Err(HttpError::internal(format!(
                    "argument {index} is {other:?}, not a value"
                ))
                .into());
            }
        };

        serde_json::from_value(value.clone()).or_else(|err| match &value {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|_| HttpError::BadRequest(format!("invalid argument {index}: {err}")).into()),
            _ => Err(HttpError::BadRequest(format!("invalid argument {index}: {err}")).into()),
        })
    }

    pub fn request(&self, index: usize) -> Option<&Request> {
        match self.get(index) {
            Arg::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn responder(&self, index: usize) -> Option<&Responder> {
        match self.get(index) {
            Arg::Response(res) => Some(res),
            _ => None,
        }
    }

    pub fn next(&self, index: usize) -> Option<&Next> {
        match self.get(index) {
            Arg::Next(next) => Some(next),
            _ => None,
        }
    }

    pub fn into_vec(self) -> Vec<Arg> { self.0 }
}

/// Builds the positional arguments for `params`.
///
/// The result has `max(index) + 1` slots; positions nothing was declared
/// for stay [`Arg::Undefined`].
///
/// A source the request does not carry at all (no `Cookie` header, an
/// empty or non-JSON body) resolves to the request itself when the
/// parameter is unnamed, and to `Undefined` when it is named.
pub fn extract_parameters(
    req: &Request,
    res: &Responder,
    next: &Next,
    params: &[ParameterDeclaration],
) -> Args {
    let len = params.iter().map(|p| p.index + 1).max().unwrap_or(0);
    let mut args = vec![Arg::Undefined; len];

    for param in params {
        let name = param.name.as_deref();
        args[param.index] = match param.source {
            ParamSource::Request => Arg::Request(req.clone()),
            ParamSource::Response => Arg::Response(res.clone()),
            ParamSource::Next => Arg::Next(next.clone()),
            ParamSource::Path => from_object(req, Some(string_map(req.params().iter())), name),
            ParamSource::Query => from_object(req, Some(string_map(req.query_map().iter())), name),
            ParamSource::Header => from_object(req, Some(headers(req)), name.map(str::to_ascii_lowercase).as_deref()),
            ParamSource::Cookie => from_object(req, req.cookies().map(|c| string_map(c.iter())), name),
            ParamSource::Body => from_body(req, name),
        };
    }

    Args(args)
}

fn from_object(req: &Request, source: Option<Map<String, Value>>, name: Option<&str>) -> Arg {
    match (source, name) {
        (Some(mut map), Some(name)) => map.remove(name).map(Arg::Value).unwrap_or(Arg::Undefined),
        (Some(map), None) => Arg::Value(Value::Object(map)),
        (None, Some(_)) => Arg::Undefined,
        (None, None) => Arg::Request(req.clone()),
    }
}

fn from_body(req: &Request, name: Option<&str>) -> Arg {
    match (req.json_body(), name) {
        (Some(Value::Object(mut map)), Some(name)) => {
            map.remove(name).map(Arg::Value).unwrap_or(Arg::Undefined)
        }
        (Some(_), Some(_)) => Arg::Undefined,
        (Some(body), None) => Arg::Value(body),
        (None, Some(_)) => Arg::Undefined,
        (None, None) => Arg::Request(req.clone()),
    }
}

fn string_map<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> Map<String, Value> {
    pairs.map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect()
}

/// Header names lowercased; repeated headers joined with `", "`.
fn headers(req: &Request) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in req.headers() {
        let name = name.to_ascii_lowercase();
        match map.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(name, Value::String(value.clone()));
            }
        }
    }
    map
}
