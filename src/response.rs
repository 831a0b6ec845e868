//! Outgoing HTTP response value, plus the conversions handlers and
//! controller actions use to produce one.

use bytes::Bytes;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;

use crate::status::Status;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use trellis::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(Status::NoContent);
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::with_body("application/json", body.into())
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_body("text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn status(code: impl Into<u16>) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code.into() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.code() }
    }

    fn with_body(content_type: &str, body: Bytes) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: Status::Ok.code(),
        }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the hyper response the server writes to the wire.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            // an invalid status code or header made it this far; answer 500
            let mut res = http::Response::new(Full::new(Bytes::new()));
            *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            res
        })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: impl Into<u16>) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish("application/json", body.into())
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", Bytes::from(body.into()))
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to pass them to
/// [`Responder::send`](crate::Responder::send) directly.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response { Response::json(self.to_string()) }
}

/// Serializes `T` as a JSON body.
///
/// A value that fails to serialize becomes `500 Internal Server Error`.
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                tracing::error!("failed to serialize response body: {e}");
                Response::status(Status::InternalServerError)
            }
        }
    }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// What a controller action may return.
///
/// `()` and `None` mean "no content": the generated route handler sends
/// nothing and leaves the response to whoever holds the
/// [`Responder`](crate::Responder). Everything else replies with its
/// [`Response`].
pub trait IntoReply {
    fn into_reply(self) -> Option<Response>;
}

impl IntoReply for () {
    fn into_reply(self) -> Option<Response> { None }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Option<Response> { self.and_then(IntoReply::into_reply) }
}

macro_rules! reply_via_response {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Option<Response> { Some(self.into_response()) }
            }
        )+
    };
}

reply_via_response!(Response, &'static str, String, Status, Value);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Option<Response> { Some(self.into_response()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_puts_content_type_first() {
        let res = Response::builder()
            .status(Status::Created)
            .header("location", "/users/1")
            .json("{}");
        assert_eq!(res.status_code(), 201);
        assert_eq!(res.headers()[0].0, "content-type");
        assert_eq!(res.header("Location"), Some("/users/1"));
    }

    #[test]
    fn unit_and_none_are_no_content() {
        assert!(().into_reply().is_none());
        assert!(None::<String>.into_reply().is_none());
        assert!(Some("hi").into_reply().is_some());
    }

    #[test]
    fn json_wrapper_serializes() {
        let res = Json(json!({"id": 7})).into_response();
        assert_eq!(res.body(), br#"{"id":7}"#);
        assert_eq!(res.header("content-type"), Some("application/json"));
    }

    #[test]
    fn converts_into_http() {
        let res = Response::builder().status(Status::Accepted).text("queued").into_http();
        assert_eq!(res.status(), http::StatusCode::ACCEPTED);
        assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    }
}
