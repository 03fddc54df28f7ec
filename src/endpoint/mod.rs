//! Typed endpoint descriptors.
//!
//! An [`Endpoint`] binds a path template and HTTP method to the request and
//! response types of one logical operation. Descriptors are immutable and
//! cheap to share; they are usually declared as constants:
//!
//! ```rust
//! use clientry::{Endpoint, EmptyRequest};
//! use serde_json::Value;
//!
//! const STATUS: Endpoint<EmptyRequest, Value> = Endpoint::get("/status/{code}");
//! ```

use crate::errors::{ClientError, ClientResult};
use crate::transport::Method;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

/// Descriptor for one HTTP operation with request type `Req` and response type `Resp`.
pub struct Endpoint<Req, Resp> {
    path: Cow<'static, str>,
    method: Method,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Endpoint<Req, Resp> {
    /// Create a descriptor from a static path template.
    pub const fn new(method: Method, path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            method,
            _types: PhantomData,
        }
    }

    /// Create a descriptor from an owned path template.
    pub fn from_template(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: Cow::Owned(path.into()),
            method,
            _types: PhantomData,
        }
    }

    /// GET descriptor.
    pub const fn get(path: &'static str) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST descriptor.
    pub const fn post(path: &'static str) -> Self {
        Self::new(Method::Post, path)
    }

    /// PUT descriptor.
    pub const fn put(path: &'static str) -> Self {
        Self::new(Method::Put, path)
    }

    /// PATCH descriptor.
    pub const fn patch(path: &'static str) -> Self {
        Self::new(Method::Patch, path)
    }

    /// DELETE descriptor.
    pub const fn delete(path: &'static str) -> Self {
        Self::new(Method::Delete, path)
    }

    /// The path template.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Names of the placeholders in the template, in order of appearance.
    ///
    /// A name that appears twice is listed twice.
    pub fn placeholders(&self) -> ClientResult<Vec<&str>> {
        let mut names = Vec::new();
        for segment in parse_template(&self.path)? {
            if let Segment::Placeholder(name) = segment {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Substitute `params` into the template and return the concrete path.
    ///
    /// Every placeholder must have a value and every value must match a
    /// placeholder. Values are inserted verbatim.
    pub fn render(&self, params: &BTreeMap<String, String>) -> ClientResult<String> {
        let segments = parse_template(&self.path)?;

        let expected: BTreeSet<&str> = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(*name),
                Segment::Literal(_) => None,
            })
            .collect();

        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|name| !params.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(ClientError::template(
                self.path.as_ref(),
                format!("missing path parameter(s): {}", missing.join(", ")),
            ));
        }

        let unexpected: Vec<&str> = params
            .keys()
            .map(String::as_str)
            .filter(|name| !expected.contains(name))
            .collect();
        if !unexpected.is_empty() {
            return Err(ClientError::template(
                self.path.as_ref(),
                format!("unknown path parameter(s): {}", unexpected.join(", ")),
            ));
        }

        let mut rendered = String::with_capacity(self.path.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    // Presence checked above
                    if let Some(value) = params.get(name) {
                        rendered.push_str(value);
                    }
                }
            }
        }
        Ok(rendered)
    }

    /// Return a copy of this descriptor with its placeholders bound.
    ///
    /// The original descriptor is left untouched.
    pub fn bind(&self, params: &BTreeMap<String, String>) -> ClientResult<Self> {
        let path = self.render(params)?;
        Ok(Self::from_template(self.method, path))
    }

    /// Return a copy of this descriptor with a different path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self::from_template(self.method, path)
    }
}

impl<Req, Resp> Clone for Endpoint<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            method: self.method,
            _types: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for Endpoint<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("request", &std::any::type_name::<Req>())
            .field("response", &std::any::type_name::<Resp>())
            .finish()
    }
}

impl<Req, Resp> fmt::Display for Endpoint<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn parse_template(template: &str) -> ClientResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(ClientError::template(template, "unmatched '}'"));
        }
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after
            .find(['{', '}'])
            .filter(|&i| after.as_bytes()[i] == b'}')
            .ok_or_else(|| ClientError::template(template, "unclosed '{'"))?;
        let name = &after[..close];
        if name.is_empty() {
            return Err(ClientError::template(template, "empty placeholder"));
        }
        segments.push(Segment::Placeholder(name));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_without_placeholders() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/get");
        assert_eq!(endpoint.render(&BTreeMap::new()).unwrap(), "/get");
    }

    #[test]
    fn test_render_substitutes_values() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/status/{code}");
        assert_eq!(
            endpoint.render(&params(&[("code", "418")])).unwrap(),
            "/status/418"
        );
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/{a}/x/{a}");
        assert_eq!(endpoint.render(&params(&[("a", "1")])).unwrap(), "/1/x/1");
        assert_eq!(endpoint.placeholders().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn test_render_missing_parameter() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/delay/{seconds}");
        let err = endpoint.render(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ClientError::Template { .. }));
        assert!(err.to_string().contains("seconds"));
    }

    #[test]
    fn test_render_extra_parameter() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/get");
        let err = endpoint.render(&params(&[("id", "1")])).unwrap_err();
        assert!(matches!(err, ClientError::Template { .. }));
    }

    #[test]
    fn test_malformed_templates() {
        for template in ["/a/{", "/a/}", "/a/{}", "/a/{b{c}}"] {
            let endpoint: Endpoint<(), Value> = Endpoint::from_template(Method::Get, template);
            assert!(
                endpoint.placeholders().is_err(),
                "template {} should be rejected",
                template
            );
        }
    }

    #[test]
    fn test_bind_leaves_descriptor_untouched() {
        let endpoint: Endpoint<(), Value> = Endpoint::get("/status/{code}");
        let bound = endpoint.bind(&params(&[("code", "500")])).unwrap();
        assert_eq!(bound.path(), "/status/500");
        assert_eq!(bound.method(), Method::Get);
        assert_eq!(endpoint.path(), "/status/{code}");
    }

    #[test]
    fn test_with_path_copies() {
        const ANYTHING: Endpoint<Value, Value> = Endpoint::post("/anything");
        let copy = ANYTHING.with_path("/anything/else");
        assert_eq!(copy.path(), "/anything/else");
        assert_eq!(ANYTHING.path(), "/anything");
        assert_eq!(copy.to_string(), "POST /anything/else");
    }
}
