use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::request::Parts;
use http_body::Body;
use http_body_util::Full;
use tonic::Status;
use tower::{Layer, Service, ServiceExt};

use crate::{
    call::{CallResult, LiveCall, RecordedCall},
    cassette::Cassette,
    error::{BoxError, VcrError, VcrResult},
    frame,
    interaction::{InteractionRequest, Metadata, RpcType},
    record_mode::RecordMode,
    registry::{MethodInfo, MethodRegistry},
};

/// Request headers set by the transport rather than by the caller. They never take part in matching.
pub const RESERVED_REQUEST_HEADERS: [&str; 7] =
    ["te", "content-type", "user-agent", "grpc-timeout", "grpc-encoding", "grpc-accept-encoding", "host"];

/// Outgoing call whose request messages are already drained.
#[derive(Debug)]
pub struct OutgoingCall {
    head: Parts,
    messages: Vec<Bytes>,
    rpc_type: Option<RpcType>,
    response_type: Option<String>,
}
impl OutgoingCall {
    pub fn new(head: Parts, messages: Vec<Bytes>) -> Self {
        Self { head, messages, rpc_type: None, response_type: None }
    }

    /// Drain the whole request body. The request stream must end.
    pub async fn drain<B>(request: http::Request<B>) -> VcrResult<Self>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        let (bytes, _trailers) = frame::collect(body).await?;
        Ok(Self::new(head, frame::decode(bytes)?))
    }

    pub fn with_rpc_type(mut self, rpc_type: RpcType) -> Self {
        self.rpc_type = Some(rpc_type);
        self
    }

    pub fn with_response_type(mut self, response_type: Option<String>) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn method(&self) -> &str {
        self.head.uri.path()
    }

    pub fn messages(&self) -> &[Bytes] {
        &self.messages
    }

    pub fn interaction_request(&self) -> InteractionRequest {
        InteractionRequest::new(self.method(), frame::concat(&self.messages))
            .with_metadata(Metadata::from_headers(&self.head.headers, &RESERVED_REQUEST_HEADERS))
    }
}

/// Decides, per call, between replaying from the cassette and calling the backend and recording what it returns.
#[derive(Debug, Clone)]
pub struct Interceptor {
    cassette: Arc<Cassette>,
    registry: Arc<MethodRegistry>,
}
impl Interceptor {
    pub fn new(cassette: Arc<Cassette>, registry: Arc<MethodRegistry>) -> Self {
        Self { cassette, registry }
    }

    pub fn cassette(&self) -> &Arc<Cassette> {
        &self.cassette
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// `Ok(None)` means the backend has to be called.
    pub fn replay(&self, request: &InteractionRequest) -> VcrResult<Option<CallResult>> {
        if !self.cassette.record_mode().replays() {
            return Ok(None);
        }
        match self.cassette.find(request) {
            Some(interaction) => {
                tracing::debug!(method = %request.method, "replay recorded interaction");
                Ok(Some(CallResult::Recorded(RecordedCall::from_interaction(&interaction))))
            }
            None if !self.cassette.can_record() => {
                tracing::debug!(method = %request.method, "no recorded interaction and recording is disabled");
                Err(VcrError::RecordingDisabled { method: request.method.clone() })
            }
            None => {
                tracing::debug!(method = %request.method, "no recorded interaction, call backend");
                Ok(None)
            }
        }
    }

    pub async fn intercept<S, B>(&self, inner: &mut S, call: OutgoingCall) -> VcrResult<CallResult>
    where
        S: Service<http::Request<tonic::body::Body>, Response = http::Response<B>>,
        S::Error: Into<BoxError>,
        B: Body,
        B::Error: Into<BoxError>,
    {
        let request = call.interaction_request();
        if let Some(replayed) = self.replay(&request)? {
            return Ok(replayed);
        }

        let OutgoingCall { head, messages, rpc_type, response_type } = call;
        let live = live_call(inner, head, frame::encode(&messages)?).await;

        let info = match rpc_type {
            Some(rpc_type) => MethodInfo {
                rpc_type,
                response_type: self.registry.get(&request.method).and_then(|info| info.response_type.clone()),
            },
            None => self.registry.resolve(&request.method, messages.len(), live.messages().len()),
        };
        let response_type = info.response_type.or(response_type);
        let interaction = live.to_interaction(request, info.rpc_type, response_type.clone());
        self.cassette.record(interaction.clone());

        match self.cassette.record_mode() {
            RecordMode::All => Ok(CallResult::Live(live.with_response_type(response_type))),
            _ => Ok(CallResult::Recorded(RecordedCall::freshly_recorded(&interaction))),
        }
    }
}

async fn live_call<S, B>(inner: &mut S, head: Parts, body: Bytes) -> LiveCall
where
    S: Service<http::Request<tonic::body::Body>, Response = http::Response<B>>,
    S::Error: Into<BoxError>,
    B: Body,
    B::Error: Into<BoxError>,
{
    let request = http::Request::from_parts(head, tonic::body::Body::new(Full::new(body)));
    let ready = inner.ready().await.map_err(Into::into);
    let response = match ready {
        Ok(service) => service.call(request).await.map_err(Into::into),
        Err(e) => Err(e),
    };
    let (head, body) = match response {
        Ok(response) => response.into_parts(),
        Err(e) => {
            let status = Status::from_error(e);
            tracing::warn!(code = ?status.code(), message = status.message(), "backend call failed");
            return LiveCall::failed(status);
        }
    };
    let drained = frame::collect(body).await.and_then(|(bytes, trailers)| Ok((frame::decode(bytes)?, trailers)));
    match drained {
        Ok((messages, trailers)) => LiveCall::from_parts(head, messages, trailers),
        Err(e) => LiveCall::failed(Status::from_error(Box::new(e))),
    }
}

/// Record/replay in front of any gRPC transport. It is itself a transport, so generated clients wrap it unchanged.
#[derive(Debug, Clone)]
pub struct VcrService<S> {
    inner: S,
    interceptor: Interceptor,
}
impl<S> VcrService<S> {
    pub fn new(inner: S, cassette: Arc<Cassette>, registry: Arc<MethodRegistry>) -> Self {
        Self { inner, interceptor: Interceptor::new(cassette, registry) }
    }

    pub fn cassette(&self) -> &Arc<Cassette> {
        self.interceptor.cassette()
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}
impl<S, B> VcrService<S>
where
    S: Service<http::Request<tonic::body::Body>, Response = http::Response<B>>,
    S::Error: Into<BoxError>,
    B: Body,
    B::Error: Into<BoxError>,
{
    pub async fn intercept(&mut self, call: OutgoingCall) -> VcrResult<CallResult> {
        self.interceptor.intercept(&mut self.inner, call).await
    }
}
impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for VcrService<S>
where
    S: Service<http::Request<tonic::body::Body>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Body + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = VcrError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // the wrapped service is only driven to readiness when a call goes live
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();
        Box::pin(async move {
            let call = OutgoingCall::drain(request).await?;
            let result = interceptor.intercept(&mut inner, call).await?;
            Ok(result.into_http_response())
        })
    }
}

#[derive(Debug, Clone)]
pub struct VcrLayer {
    interceptor: Interceptor,
}
impl VcrLayer {
    pub fn new(cassette: Arc<Cassette>, registry: Arc<MethodRegistry>) -> Self {
        Self { interceptor: Interceptor::new(cassette, registry) }
    }
}
impl<S> Layer<S> for VcrLayer {
    type Service = VcrService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VcrService { inner, interceptor: self.interceptor.clone() }
    }
}
