//! HTTP method as a typed enum.
//!
//! Covers the RFC 9110 standard methods — the full set the gateway's route
//! chart registers. The router keys one radix tree per method, so the enum
//! doubles as that key. A request whose method parses to none of these is
//! rejected at the server level with `405 Method Not Allowed` before it
//! ever reaches dispatch.

use std::fmt;
use std::str::FromStr;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }

    /// Maps a parsed [`http::Method`] onto the typed enum, `None` for
    /// extension methods the chart never registers.
    pub fn from_http(method: &http::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_http() {
        assert_eq!(Method::from_http(&http::Method::GET), Some(Method::Get));
        assert_eq!(Method::from_http(&http::Method::DELETE), Some(Method::Delete));
    }

    #[test]
    fn extension_methods_are_unknown() {
        let purge = http::Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(Method::from_http(&purge), None);
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert!("get".parse::<Method>().is_err());
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
    }
}
