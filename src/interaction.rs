use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;
use tonic::{metadata::MetadataMap, Code};

use crate::serialization::{base64_bytes, base64_messages, code_name};

pub const CASSETTE_VERSION: u32 = 1;

/// Ordered multimap of gRPC metadata. Keys keep first-insertion order, values keep arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    entries: Vec<(String, Vec<String>)>,
}
impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values_mut(key.into()).push(value.into());
    }

    pub fn extend_key(&mut self, key: impl Into<String>, values: impl IntoIterator<Item = String>) {
        self.values_mut(key.into()).extend(values);
    }

    fn values_mut(&mut self, key: String) -> &mut Vec<String> {
        let index = match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                self.entries.push((key, Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every header except the `skip`ped names. Binary values stay in their base64 wire form, and opaque
    /// (obs-text) bytes are kept one char per byte so [`Metadata::to_headers`] restores them exactly.
    pub fn from_headers(headers: &HeaderMap, skip: &[&str]) -> Self {
        let mut metadata = Self::new();
        for (name, value) in headers {
            if skip.contains(&name.as_str()) {
                continue;
            }
            let value = match value.to_str() {
                Ok(value) => value.to_string(),
                Err(_) => value.as_bytes().iter().copied().map(char::from).collect(),
            };
            metadata.append(name.as_str(), value);
        }
        metadata
    }

    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (key, values) in self.iter() {
            let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
                tracing::warn!(key, "skip metadata key that is not a valid header name");
                continue;
            };
            for value in values {
                match HeaderValue::from_bytes(&header_bytes(value)) {
                    Ok(value) => {
                        headers.append(name.clone(), value);
                    }
                    Err(_) => tracing::warn!(key, "skip metadata value that is not a valid header value"),
                }
            }
        }
        headers
    }

    pub fn from_metadata_map(metadata: &MetadataMap) -> Self {
        Self::from_headers(&metadata.clone().into_headers(), &[])
    }

    pub fn to_metadata_map(&self) -> MetadataMap {
        MetadataMap::from_headers(self.to_headers())
    }
}
fn header_bytes(value: &str) -> Vec<u8> {
    match value.chars().map(|c| u8::try_from(c).ok()).collect::<Option<Vec<u8>>>() {
        Some(bytes) => bytes,
        None => value.as_bytes().to_vec(),
    }
}
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.append(key, value);
        }
        metadata
    }
}
impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}
impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;
        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map from metadata key to a list of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut metadata = Metadata::new();
                while let Some((key, values)) = access.next_entry::<String, Vec<String>>()? {
                    metadata.extend_key(key, values);
                }
                Ok(metadata)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Metadata::new())
            }
        }
        deserializer.deserialize_map(MetadataVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub method: String,
    #[serde(with = "base64_bytes")]
    pub body: Bytes,
    #[serde(default)]
    pub metadata: Metadata,
}
impl InteractionRequest {
    pub fn new(method: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { method: method.into(), body: body.into(), metadata: Metadata::new() }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Recorded outcome of a call that returns a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(with = "base64_bytes")]
    pub body: Bytes,
    #[serde(with = "code_name")]
    pub code: Code,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub trailing_metadata: Metadata,
    #[serde(default)]
    pub response_type: Option<String>,
}
impl InteractionResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            code: Code::Ok,
            details: None,
            trailing_metadata: Metadata::new(),
            response_type: None,
        }
    }

    pub fn error(code: Code, details: impl Into<String>) -> Self {
        Self { code, details: Some(details.into()), ..Self::ok(Bytes::new()) }
    }
}

/// Recorded outcome of a call that returns a stream of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingInteractionResponse {
    #[serde(with = "base64_messages")]
    pub messages: Vec<Bytes>,
    #[serde(with = "code_name")]
    pub code: Code,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub trailing_metadata: Metadata,
    #[serde(default)]
    pub response_type: Option<String>,
}
impl StreamingInteractionResponse {
    pub fn ok(messages: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            code: Code::Ok,
            details: None,
            trailing_metadata: Metadata::new(),
            response_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedResponse {
    Single(InteractionResponse),
    Streaming(StreamingInteractionResponse),
}
impl RecordedResponse {
    pub fn code(&self) -> Code {
        match self {
            Self::Single(r) => r.code,
            Self::Streaming(r) => r.code,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Single(r) => r.details.as_deref(),
            Self::Streaming(r) => r.details.as_deref(),
        }
    }

    pub fn trailing_metadata(&self) -> &Metadata {
        match self {
            Self::Single(r) => &r.trailing_metadata,
            Self::Streaming(r) => &r.trailing_metadata,
        }
    }

    pub fn response_type(&self) -> Option<&str> {
        match self {
            Self::Single(r) => r.response_type.as_deref(),
            Self::Streaming(r) => r.response_type.as_deref(),
        }
    }

    /// Messages a client observes. A failed single-response call observes none.
    pub fn messages(&self) -> Vec<Bytes> {
        match self {
            Self::Single(r) if r.code == Code::Ok => vec![r.body.clone()],
            Self::Single(_) => Vec::new(),
            Self::Streaming(r) => r.messages.clone(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcType {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}
impl RpcType {
    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => Self::Unary,
            (false, true) => Self::ServerStreaming,
            (true, false) => Self::ClientStreaming,
            (true, true) => Self::BidiStreaming,
        }
    }

    pub fn is_client_streaming(&self) -> bool {
        matches!(self, Self::ClientStreaming | Self::BidiStreaming)
    }

    pub fn is_server_streaming(&self) -> bool {
        matches!(self, Self::ServerStreaming | Self::BidiStreaming)
    }
}
impl fmt::Display for RpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server_streaming",
            Self::ClientStreaming => "client_streaming",
            Self::BidiStreaming => "bidi_streaming",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{rpc_type} interaction cannot hold a {} response", shape_name(.streaming))]
pub struct InteractionShapeError {
    pub rpc_type: RpcType,
    pub streaming: bool,
}
fn shape_name(streaming: &bool) -> &'static str {
    if *streaming {
        "streaming"
    } else {
        "single"
    }
}

/// One recorded call. The response variant always agrees with the rpc type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InteractionRepr", into = "InteractionRepr")]
pub struct Interaction {
    request: InteractionRequest,
    response: RecordedResponse,
    rpc_type: RpcType,
}
impl Interaction {
    pub fn new(
        request: InteractionRequest,
        response: RecordedResponse,
        rpc_type: RpcType,
    ) -> Result<Self, InteractionShapeError> {
        let streaming = response.is_streaming();
        if streaming != rpc_type.is_server_streaming() {
            return Err(InteractionShapeError { rpc_type, streaming });
        }
        Ok(Self { request, response, rpc_type })
    }

    pub fn unary(request: InteractionRequest, response: InteractionResponse) -> Self {
        Self { request, response: RecordedResponse::Single(response), rpc_type: RpcType::Unary }
    }

    pub fn client_streaming(request: InteractionRequest, response: InteractionResponse) -> Self {
        Self { request, response: RecordedResponse::Single(response), rpc_type: RpcType::ClientStreaming }
    }

    pub fn server_streaming(request: InteractionRequest, response: StreamingInteractionResponse) -> Self {
        Self { request, response: RecordedResponse::Streaming(response), rpc_type: RpcType::ServerStreaming }
    }

    pub fn bidi_streaming(request: InteractionRequest, response: StreamingInteractionResponse) -> Self {
        Self { request, response: RecordedResponse::Streaming(response), rpc_type: RpcType::BidiStreaming }
    }

    pub fn request(&self) -> &InteractionRequest {
        &self.request
    }

    pub fn response(&self) -> &RecordedResponse {
        &self.response
    }

    pub fn rpc_type(&self) -> RpcType {
        self.rpc_type
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }
}

#[derive(Serialize, Deserialize)]
struct InteractionRepr {
    request: InteractionRequest,
    response: RecordedResponse,
    rpc_type: RpcType,
}
impl TryFrom<InteractionRepr> for Interaction {
    type Error = InteractionShapeError;
    fn try_from(InteractionRepr { request, response, rpc_type }: InteractionRepr) -> Result<Self, Self::Error> {
        Self::new(request, response, rpc_type)
    }
}
impl From<Interaction> for InteractionRepr {
    fn from(Interaction { request, response, rpc_type }: Interaction) -> Self {
        Self { request, response, rpc_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CassetteData {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}
impl Default for CassetteData {
    fn default() -> Self {
        Self { version: CASSETTE_VERSION, interactions: Vec::new() }
    }
}
fn default_version() -> u32 {
    CASSETTE_VERSION
}
