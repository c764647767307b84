//! Binary introspection protocol spoken over the helper's stdio.
//!
//! The parent writes one length-delimited [`ExtendsRequest`] to the helper's
//! stdin and closes it. The helper writes one [`ExtendsResponse`] to stdout
//! and exits; the parent reads until EOF, so the response carries no length
//! prefix. Both messages are protobuf-encoded.

use prost::Message;

use crate::error::ExtenderError;

/// Bundle to introspect.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ExtendsBasicInfo {
    /// Publisher group.
    #[prost(string, tag = "1")]
    pub group: String,
    /// Project within the group.
    #[prost(string, tag = "2")]
    pub project: String,
    /// Bundle version.
    #[prost(string, tag = "3")]
    pub version: String,
}

/// Batch of bundles to introspect.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ExtendsRequest {
    /// Requested bundles.
    #[prost(message, repeated, tag = "1")]
    pub extends: Vec<ExtendsBasicInfo>,
}

/// Driver exported by a bundle.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Plugin {
    /// `group:project:driver`.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Display name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Publisher group.
    #[prost(string, tag = "3")]
    pub group: String,
    /// Project within the group.
    #[prost(string, tag = "4")]
    pub project: String,
}

/// Introspection result for one bundle.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ExtendsInfo {
    /// `group:project:version`.
    #[prost(string, tag = "1")]
    pub id: String,
    /// `group:project`.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Publisher group.
    #[prost(string, tag = "3")]
    pub group: String,
    /// Project within the group.
    #[prost(string, tag = "4")]
    pub project: String,
    /// Bundle version.
    #[prost(string, tag = "5")]
    pub version: String,
    /// Exported drivers.
    #[prost(message, repeated, tag = "6")]
    pub plugins: Vec<Plugin>,
}

/// Introspection results for every loadable bundle of a request.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ExtendsResponse {
    /// Loadable bundles.
    #[prost(message, repeated, tag = "1")]
    pub extends: Vec<ExtendsInfo>,
}

/// Frames a request for the helper's stdin.
#[must_use]
pub fn encode_request(request: &ExtendsRequest) -> Vec<u8> {
    request.encode_length_delimited_to_vec()
}

/// Decodes a framed request read from stdin.
///
/// # Errors
///
/// Returns [`ExtenderError::Decode`] for truncated or malformed input.
pub fn decode_request(bytes: &[u8]) -> Result<ExtendsRequest, ExtenderError> {
    ExtendsRequest::decode_length_delimited(bytes).map_err(|error| ExtenderError::Decode {
        what: "introspection request",
        message: error.to_string(),
    })
}

/// Encodes a response for the helper's stdout.
#[must_use]
pub fn encode_response(response: &ExtendsResponse) -> Vec<u8> {
    response.encode_to_vec()
}

/// Decodes a response read from the helper's stdout.
///
/// # Errors
///
/// Returns [`ExtenderError::Decode`] for malformed output.
pub fn decode_response(bytes: &[u8]) -> Result<ExtendsResponse, ExtenderError> {
    ExtendsResponse::decode(bytes).map_err(|error| ExtenderError::Decode {
        what: "introspection response",
        message: error.to_string(),
    })
}
