use std::{
    collections::VecDeque,
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures::Stream;
use http::{header::CONTENT_TYPE, response::Parts, HeaderMap, HeaderValue, StatusCode};
use tonic::{metadata::MetadataMap, Code, Status};

use crate::{
    decode::Decoder,
    frame,
    interaction::{
        Interaction, InteractionRequest, InteractionResponse, Metadata, RpcType, StreamingInteractionResponse,
    },
};

/// Headers carrying the call status or transport details rather than user metadata.
pub const RESERVED_RESPONSE_HEADERS: [&str; 6] =
    ["content-type", "grpc-status", "grpc-message", "grpc-encoding", "grpc-accept-encoding", "date"];

/// What a client can observe about a finished call.
///
/// Replayed calls have nothing in flight, so the lifecycle methods are fixed: they cannot be cancelled, are always
/// done and never active.
pub trait Call {
    fn code(&self) -> Code;
    fn details(&self) -> Option<&str>;
    fn trailing_metadata(&self) -> MetadataMap;
    fn initial_metadata(&self) -> MetadataMap;
    fn is_replayed(&self) -> bool;

    fn cancel(&self) -> bool {
        false
    }
    fn cancelled(&self) -> bool {
        false
    }
    fn done(&self) -> bool {
        true
    }
    fn is_active(&self) -> bool {
        false
    }
    fn time_remaining(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    code: Code,
    details: Option<String>,
    trailing_metadata: Metadata,
    initial_metadata: Metadata,
    replayed: bool,
}
impl Outcome {
    fn status(&self) -> Option<Status> {
        (self.code != Code::Ok).then(|| {
            Status::with_metadata(
                self.code,
                self.details.clone().unwrap_or_default(),
                self.trailing_metadata.to_metadata_map(),
            )
        })
    }
}

/// Call rebuilt from a recorded interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    messages: Vec<Bytes>,
    response_type: Option<String>,
    outcome: Outcome,
}
impl RecordedCall {
    pub fn from_interaction(interaction: &Interaction) -> Self {
        let response = interaction.response();
        Self {
            messages: response.messages(),
            response_type: response.response_type().map(ToString::to_string),
            outcome: Outcome {
                code: response.code(),
                details: response.details().map(ToString::to_string),
                trailing_metadata: response.trailing_metadata().clone(),
                initial_metadata: Metadata::new(),
                replayed: true,
            },
        }
    }

    /// Call rebuilt from an interaction this very call has just recorded, so it is not a replay.
    pub fn freshly_recorded(interaction: &Interaction) -> Self {
        let mut call = Self::from_interaction(interaction);
        call.outcome.replayed = false;
        call
    }

    /// Response emitting every recorded message and only then the trailers with the recorded status.
    pub fn into_http_response(self) -> http::Response<tonic::body::Body> {
        let status = Status::new(self.outcome.code, self.outcome.details.unwrap_or_default());
        synthetic_response(&self.messages, &status, &self.outcome.trailing_metadata)
    }
}

/// Call that went to the backend, kept as received.
#[derive(Debug)]
pub struct LiveCall {
    head: Option<Parts>,
    messages: Vec<Bytes>,
    trailers: Option<HeaderMap>,
    status: Status,
    response_type: Option<String>,
    outcome: Outcome,
}
impl LiveCall {
    /// Status comes from the trailers, else from the headers of a trailers-only response, else from the HTTP status.
    pub fn from_parts(head: Parts, messages: Vec<Bytes>, trailers: Option<HeaderMap>) -> Self {
        let from_trailers = trailers.as_ref().and_then(|t| Some((Status::from_header_map(t)?, t.clone())));
        let (status, status_headers, trailers_only) = match from_trailers {
            Some((status, headers)) => (status, headers, false),
            None => match Status::from_header_map(&head.headers) {
                Some(status) => (status, head.headers.clone(), true),
                None => (status_from_http(head.status), trailers.clone().unwrap_or_default(), false),
            },
        };
        let initial_metadata = match trailers_only {
            true => Metadata::new(),
            false => Metadata::from_headers(&head.headers, &RESERVED_RESPONSE_HEADERS),
        };
        let outcome = Outcome {
            code: status.code(),
            details: (status.code() != Code::Ok).then(|| status.message().to_string()),
            trailing_metadata: Metadata::from_headers(&status_headers, &RESERVED_RESPONSE_HEADERS),
            initial_metadata,
            replayed: false,
        };
        Self { head: Some(head), messages, trailers, status, response_type: None, outcome }
    }

    /// Call that failed before any response arrived.
    pub fn failed(status: Status) -> Self {
        let outcome = Outcome {
            code: status.code(),
            details: Some(status.message().to_string()),
            trailing_metadata: Metadata::from_metadata_map(status.metadata()),
            initial_metadata: Metadata::new(),
            replayed: false,
        };
        Self { head: None, messages: Vec::new(), trailers: None, status, response_type: None, outcome }
    }

    /// Tag the live response with the message type it was recorded under.
    pub fn with_response_type(mut self, response_type: Option<String>) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn messages(&self) -> &[Bytes] {
        &self.messages
    }

    /// Interaction of the given shape holding what was received.
    ///
    /// A single-response shape that succeeded without exactly one message is stored as its streaming counterpart,
    /// so the messages replay exactly as received.
    pub fn to_interaction(
        &self,
        request: InteractionRequest,
        rpc_type: RpcType,
        response_type: Option<String>,
    ) -> Interaction {
        let Outcome { code, details, trailing_metadata, .. } = self.outcome.clone();
        let rpc_type = match rpc_type {
            RpcType::Unary | RpcType::ClientStreaming if code == Code::Ok && self.messages.len() != 1 => {
                let widened = RpcType::from_streaming(rpc_type.is_client_streaming(), true);
                let messages = self.messages.len();
                tracing::warn!(%rpc_type, %widened, messages, "single response call did not return one message");
                widened
            }
            rpc_type => rpc_type,
        };
        let streaming = || StreamingInteractionResponse {
            messages: self.messages.clone(),
            code,
            details: details.clone(),
            trailing_metadata: trailing_metadata.clone(),
            response_type: response_type.clone(),
        };
        let single = || InteractionResponse {
            body: match (code, self.messages.as_slice()) {
                (Code::Ok, [message]) => message.clone(),
                _ => Bytes::new(),
            },
            code,
            details: details.clone(),
            trailing_metadata: trailing_metadata.clone(),
            response_type: response_type.clone(),
        };
        match rpc_type {
            RpcType::Unary => Interaction::unary(request, single()),
            RpcType::ClientStreaming => Interaction::client_streaming(request, single()),
            RpcType::ServerStreaming => Interaction::server_streaming(request, streaming()),
            RpcType::BidiStreaming => Interaction::bidi_streaming(request, streaming()),
        }
    }

    /// The original response head, messages and trailers.
    pub fn into_http_response(self) -> http::Response<tonic::body::Body> {
        match self.head {
            Some(head) => http::Response::from_parts(head, frame::body(&self.messages, self.trailers)),
            None => synthetic_response(&self.messages, &self.status, &self.outcome.trailing_metadata),
        }
    }
}

/// Outcome of an intercepted call: rebuilt from the cassette, or live when the cassette records everything.
#[derive(Debug)]
pub enum CallResult {
    Recorded(RecordedCall),
    Live(LiveCall),
}
impl CallResult {
    fn outcome(&self) -> &Outcome {
        match self {
            Self::Recorded(call) => &call.outcome,
            Self::Live(call) => &call.outcome,
        }
    }

    pub fn messages(&self) -> &[Bytes] {
        match self {
            Self::Recorded(call) => &call.messages,
            Self::Live(call) => &call.messages,
        }
    }

    pub fn response_type(&self) -> Option<&str> {
        match self {
            Self::Recorded(call) => call.response_type.as_deref(),
            Self::Live(call) => call.response_type.as_deref(),
        }
    }

    /// Terminal error of the call, `None` when it succeeded.
    pub fn status(&self) -> Option<Status> {
        self.outcome().status()
    }

    pub fn into_http_response(self) -> http::Response<tonic::body::Body> {
        match self {
            Self::Recorded(call) => call.into_http_response(),
            Self::Live(call) => call.into_http_response(),
        }
    }

    fn into_parts(self) -> (Vec<Bytes>, Option<String>, Outcome) {
        match self {
            Self::Recorded(RecordedCall { messages, response_type, outcome }) => (messages, response_type, outcome),
            Self::Live(LiveCall { messages, response_type, outcome, .. }) => (messages, response_type, outcome),
        }
    }
}
impl Call for CallResult {
    fn code(&self) -> Code {
        self.outcome().code
    }
    fn details(&self) -> Option<&str> {
        self.outcome().details.as_deref()
    }
    fn trailing_metadata(&self) -> MetadataMap {
        self.outcome().trailing_metadata.to_metadata_map()
    }
    fn initial_metadata(&self) -> MetadataMap {
        self.outcome().initial_metadata.to_metadata_map()
    }
    fn is_replayed(&self) -> bool {
        self.outcome().replayed
    }
}

/// Finished single-response call.
#[derive(Debug)]
pub struct UnaryCall<M> {
    result: Result<M, Status>,
    outcome: Outcome,
}
impl<M> UnaryCall<M> {
    pub fn new<D: Decoder<Item = M>>(call: CallResult, mut decoder: D) -> Self {
        let (messages, response_type, outcome) = call.into_parts();
        let result = match outcome.status() {
            Some(status) => Err(status),
            None => match messages.into_iter().next() {
                Some(message) => decoder.decode(response_type.as_deref(), message),
                None => Err(Status::internal("call completed without a response message")),
            },
        };
        Self { result, outcome }
    }

    /// The response, or the status the call failed with.
    pub fn result(&self) -> Result<&M, Status> {
        self.result.as_ref().map_err(Clone::clone)
    }

    pub fn into_result(self) -> Result<M, Status> {
        self.result
    }

    /// Same shape a generated tonic client returns.
    pub fn into_response(self) -> Result<tonic::Response<M>, Status> {
        let metadata = self.outcome.initial_metadata.to_metadata_map();
        self.result.map(|message| tonic::Response::from_parts(metadata, message, Default::default()))
    }
}
impl<M> Call for UnaryCall<M> {
    fn code(&self) -> Code {
        self.outcome.code
    }
    fn details(&self) -> Option<&str> {
        self.outcome.details.as_deref()
    }
    fn trailing_metadata(&self) -> MetadataMap {
        self.outcome.trailing_metadata.to_metadata_map()
    }
    fn initial_metadata(&self) -> MetadataMap {
        self.outcome.initial_metadata.to_metadata_map()
    }
    fn is_replayed(&self) -> bool {
        self.outcome.replayed
    }
}

type DecodeFn<M> = Box<dyn FnMut(Bytes) -> Result<M, Status> + Send>;

/// Finished streaming call, yielding every message in order and then, if the call failed, its status.
pub struct StreamingCall<M> {
    messages: VecDeque<Bytes>,
    decode: DecodeFn<M>,
    terminal: Option<Status>,
    outcome: Outcome,
}
impl<M: 'static> StreamingCall<M> {
    pub fn new<D>(call: CallResult, mut decoder: D) -> Self
    where
        D: Decoder<Item = M> + Send + 'static,
    {
        let (messages, response_type, outcome) = call.into_parts();
        let decode: DecodeFn<M> = Box::new(move |bytes| decoder.decode(response_type.as_deref(), bytes));
        Self { messages: messages.into(), decode, terminal: outcome.status(), outcome }
    }
}
impl<M> StreamingCall<M> {
    /// A message that fails to decode ends the stream.
    pub fn next_message(&mut self) -> Option<Result<M, Status>> {
        match self.messages.pop_front() {
            Some(bytes) => {
                let decoded = (self.decode)(bytes);
                if decoded.is_err() {
                    self.messages.clear();
                    self.terminal = None;
                }
                Some(decoded)
            }
            None => self.terminal.take().map(Err),
        }
    }

    /// Same contract as `tonic::Streaming::message`.
    pub async fn message(&mut self) -> Result<Option<M>, Status> {
        self.next_message().transpose()
    }

    pub fn remaining(&self) -> usize {
        self.messages.len()
    }
}
impl<M> Iterator for StreamingCall<M> {
    type Item = Result<M, Status>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_message()
    }
}
impl<M> Unpin for StreamingCall<M> {}
impl<M> Stream for StreamingCall<M> {
    type Item = Result<M, Status>;
    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next_message())
    }
}
impl<M> Debug for StreamingCall<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCall")
            .field("remaining", &self.messages.len())
            .field("terminal", &self.terminal)
            .field("outcome", &self.outcome)
            .finish()
    }
}
impl<M> Call for StreamingCall<M> {
    fn code(&self) -> Code {
        self.outcome.code
    }
    fn details(&self) -> Option<&str> {
        self.outcome.details.as_deref()
    }
    fn trailing_metadata(&self) -> MetadataMap {
        self.outcome.trailing_metadata.to_metadata_map()
    }
    fn initial_metadata(&self) -> MetadataMap {
        self.outcome.initial_metadata.to_metadata_map()
    }
    fn is_replayed(&self) -> bool {
        self.outcome.replayed
    }
}

fn status_from_http(status: StatusCode) -> Status {
    let code = match status {
        StatusCode::OK => return Status::unknown("response carried no grpc-status"),
        StatusCode::BAD_REQUEST => Code::Internal,
        StatusCode::UNAUTHORIZED => Code::Unauthenticated,
        StatusCode::FORBIDDEN => Code::PermissionDenied,
        StatusCode::NOT_FOUND => Code::Unimplemented,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => Code::Unavailable,
        _ => Code::Unknown,
    };
    Status::new(code, format!("http status {status}"))
}

fn synthetic_response(messages: &[Bytes], status: &Status, metadata: &Metadata) -> http::Response<tonic::body::Body> {
    let mut trailers = metadata.to_headers();
    if let Err(e) = status.add_header(&mut trailers) {
        tracing::warn!(error = %e, "failed to encode recorded status");
    }
    let mut response = http::Response::new(frame::body(messages, Some(trailers)));
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}
