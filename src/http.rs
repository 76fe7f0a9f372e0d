//! Request and response descriptors seen by the worker

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// What the page intends to do with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    #[default]
    Empty,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Font => "font",
            Destination::Manifest => "manifest",
            Destination::Empty => "",
        }
    }
}

impl FromStr for Destination {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "document" => Ok(Destination::Document),
            "image" => Ok(Destination::Image),
            "script" => Ok(Destination::Script),
            "style" => Ok(Destination::Style),
            "font" => Ok(Destination::Font),
            "manifest" => Ok(Destination::Manifest),
            "" | "empty" => Ok(Destination::Empty),
            other => Err(WorkerError::InvalidRequest(format!(
                "Unknown destination: {}",
                other
            ))),
        }
    }
}

/// An outgoing request issued by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    /// Create a GET request with no declared destination
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            destination: Destination::Empty,
        }
    }

    /// Parse an absolute URL into a GET request
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| WorkerError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::get(url))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Identity under which the response is stored
    pub fn identity(&self) -> RequestIdentity {
        RequestIdentity {
            method: self.method.clone(),
            url: self.url.as_str().to_string(),
        }
    }

    /// Whether the request targets the given origin
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Method + full URL, treated as an opaque store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response tainting as exposed to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Basic,
    Cors,
    Opaque,
    Error,
}

/// A response snapshot: status, headers and fully buffered body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(rename = "type")]
    pub kind: ResponseType,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            kind: ResponseType::Basic,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A response whose contents are unreadable to the page
    pub fn opaque() -> Self {
        Self {
            status: 0,
            kind: ResponseType::Opaque,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_kind(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete, readable responses may enter a store
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind != ResponseType::Opaque
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheability_gate() {
        assert!(Response::new(200, "ok").is_cacheable());
        assert!(!Response::new(404, "missing").is_cacheable());
        assert!(!Response::new(206, "partial").is_cacheable());
        assert!(!Response::opaque().is_cacheable());
        assert!(!Response::new(200, "x").with_kind(ResponseType::Opaque).is_cacheable());
        assert!(Response::new(200, "x").with_kind(ResponseType::Cors).is_cacheable());
    }

    #[test]
    fn test_same_origin() {
        let origin = Url::parse("http://localhost:5173").unwrap();
        let local = Request::parse("http://localhost:5173/assets/logo.svg").unwrap();
        let other_port = Request::parse("http://localhost:8080/assets/logo.svg").unwrap();
        let cdn = Request::parse("https://fonts.example.com/inter.woff2").unwrap();

        assert!(local.is_same_origin(&origin));
        assert!(!other_port.is_same_origin(&origin));
        assert!(!cdn.is_same_origin(&origin));
    }

    #[test]
    fn test_identity_includes_method_and_query() {
        let get = Request::parse("http://localhost/api/gems?page=2").unwrap();
        let head = get.clone().with_method("head");

        assert_eq!(get.identity().to_string(), "GET http://localhost/api/gems?page=2");
        assert_ne!(get.identity(), head.identity());
    }

    #[test]
    fn test_destination_from_str() {
        assert_eq!("IMAGE".parse::<Destination>().unwrap(), Destination::Image);
        assert_eq!("".parse::<Destination>().unwrap(), Destination::Empty);
        assert!("video".parse::<Destination>().is_err());
    }

    #[test]
    fn test_response_body_serializes_as_base64() {
        let response = Response::new(200, vec![0u8, 159, 146, 150]).with_header("Content-Type", "image/png");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["body"], "AJ+Slg==");
        assert_eq!(json["type"], "basic");

        let back: Response = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, response.body);
        assert_eq!(back.header("content-type"), Some("image/png"));
    }
}
