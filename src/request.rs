//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::method::Method;

/// An incoming HTTP request.
///
/// Owned and cheap to clone (the body is a [`Bytes`] handle), so a request
/// can be handed to a middleware and, as a controller argument, to the
/// action at the same time.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: Vec<(String, String)>,
    cookies: Option<HashMap<String, String>>,
    body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Starts building a request by hand, for tests or in-process dispatch.
    ///
    /// ```rust
    /// use trellis::{Method, Request};
    ///
    /// let req = Request::builder(Method::Get, "/users?page=2")
    ///     .header("cookie", "session=abc")
    ///     .build();
    /// assert_eq!(req.query("page"), Some("2"));
    /// assert_eq!(req.cookie("session"), Some("abc"));
    /// ```
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn new(method: Method, uri: &str, headers: Vec<(String, String)>, body: Bytes) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (uri, HashMap::new()),
        };
        // HTTP/2 clients may split cookies over several `cookie` fields.
        let cookies = headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .fold(None, |merged: Option<HashMap<String, String>>, (_, v)| {
                let mut merged = merged.unwrap_or_default();
                merged.extend(parse_cookies(v));
                Some(merged)
            });

        Self {
            method,
            path: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            query,
            headers,
            cookies,
            body,
            params: HashMap::new(),
        }
    }

    /// Converts hyper request parts plus a collected body.
    pub(crate) fn from_parts(parts: &http::request::Parts, body: Bytes) -> Result<Self, Error> {
        let method = Method::try_from(&parts.method)?;
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let headers = parts
            .headers
            .iter()
            .map(|(k, v)| {
                let value = match v.to_str() {
                    Ok(value) => value.to_owned(),
                    Err(_) => {
                        debug!(header = %k, "non-UTF-8 header value, decoded lossily");
                        String::from_utf8_lossy(v.as_bytes()).into_owned()
                    }
                };
                (k.as_str().to_owned(), value)
            })
            .collect();
        Ok(Self::new(method, uri, headers, body))
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn query_map(&self) -> &HashMap<String, String> { &self.query }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.as_ref()?.get(name).map(String::as_str)
    }

    /// Parsed cookies, or `None` when the request carried no `Cookie` header.
    pub fn cookies(&self) -> Option<&HashMap<String, String>> {
        self.cookies.as_ref()
    }

    /// The body as a JSON document, or `None` when it is empty or not JSON.
    pub fn json_body(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// Deserializes the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }
}

/// Fluent builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching `content-type`.
    pub fn json(self, value: &Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    pub fn build(self) -> Request {
        Request::new(self.method, &self.uri, self.headers, self.body)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_owned(), value.trim().trim_matches('"').to_owned()))
        })
        .collect()
}
