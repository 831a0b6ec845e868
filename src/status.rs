//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] wherever a status code is accepted: `Response::status()`,
//! `Responder::set_status()`, a route's declared status, or as a bare
//! handler return value.
//!
//! ```rust
//! use trellis::{Response, Status};
//!
//! Response::status(Status::NoContent);
//!
//! Response::builder()
//!     .status(Status::Created)
//!     .header("location", "/users/42")
//!     .json(br#"{"id":42}"#.to_vec());
//!
//! assert_eq!(Status::Conflict.code(), 409);
//! assert_eq!(Status::Conflict.reason(), "Conflict");
//! ```

macro_rules! statuses {
    ($( $variant:ident = $code:literal, $reason:literal; )+) => {
        /// The status codes trellis names. Any other code still works as a
        /// plain `u16`.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum Status {
            $( $variant, )+
        }

        impl Status {
            pub fn code(self) -> u16 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }

            /// Canonical reason phrase (`"Not Found"`).
            pub fn reason(self) -> &'static str {
                match self {
                    $( Self::$variant => $reason, )+
                }
            }

            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

statuses! {
    Continue                    = 100, "Continue";
    SwitchingProtocols          = 101, "Switching Protocols";

    Ok                          = 200, "OK";
    Created                     = 201, "Created";
    Accepted                    = 202, "Accepted";
    NoContent                   = 204, "No Content";

    MovedPermanently            = 301, "Moved Permanently";
    Found                       = 302, "Found";
    SeeOther                    = 303, "See Other";
    NotModified                 = 304, "Not Modified";
    TemporaryRedirect           = 307, "Temporary Redirect";
    PermanentRedirect           = 308, "Permanent Redirect";

    BadRequest                  = 400, "Bad Request";
    Unauthorized                = 401, "Unauthorized";
    Forbidden                   = 403, "Forbidden";
    NotFound                    = 404, "Not Found";
    MethodNotAllowed            = 405, "Method Not Allowed";
    NotAcceptable               = 406, "Not Acceptable";
    RequestTimeout              = 408, "Request Timeout";
    Conflict                    = 409, "Conflict";
    Gone                        = 410, "Gone";
    PreconditionFailed          = 412, "Precondition Failed";
    ContentTooLarge             = 413, "Content Too Large";
    UnsupportedMediaType        = 415, "Unsupported Media Type";
    ImATeapot                   = 418, "I'm a Teapot";
    UnprocessableContent        = 422, "Unprocessable Content";
    TooManyRequests             = 429, "Too Many Requests";

    InternalServerError         = 500, "Internal Server Error";
    NotImplemented              = 501, "Not Implemented";
    BadGateway                  = 502, "Bad Gateway";
    ServiceUnavailable          = 503, "Service Unavailable";
    GatewayTimeout              = 504, "Gateway Timeout";
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

/// Reason phrase for any code; empty when trellis has no name for it.
pub(crate) fn reason_phrase(code: u16) -> &'static str {
    Status::from_code(code).map(Status::reason).unwrap_or("")
}
