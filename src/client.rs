use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::{
    header::{CONTENT_TYPE, TE},
    request::Parts,
    uri::PathAndQuery,
    HeaderValue, Method, Uri, Version,
};
use http_body::Body;
use tonic::metadata::MetadataMap;
use tower::Service;

use crate::{
    call::{CallResult, StreamingCall, UnaryCall},
    cassette::Cassette,
    decode::Decoder,
    error::{BoxError, VcrError, VcrResult},
    interaction::RpcType,
    service::{OutgoingCall, VcrService},
};

/// Typed client over a [`VcrService`]. Every call returns a finished call object, replayed or freshly recorded.
#[derive(Debug, Clone)]
pub struct VcrClient<S> {
    service: VcrService<S>,
}
impl<S> VcrClient<S> {
    pub fn new(service: VcrService<S>) -> Self {
        Self { service }
    }

    pub fn cassette(&self) -> &Arc<Cassette> {
        self.service.cassette()
    }

    pub fn save(&self) -> VcrResult<()> {
        self.cassette().save()
    }

    pub fn into_service(self) -> VcrService<S> {
        self.service
    }
}
impl<S, B> VcrClient<S>
where
    S: Service<http::Request<tonic::body::Body>, Response = http::Response<B>>,
    S::Error: Into<BoxError>,
    B: Body,
    B::Error: Into<BoxError>,
{
    pub async fn unary<M, D>(
        &mut self,
        path: &str,
        request: tonic::Request<M>,
        decoder: D,
    ) -> VcrResult<UnaryCall<D::Item>>
    where
        M: prost::Message,
        D: Decoder,
    {
        let (metadata, _extensions, message) = request.into_parts();
        let messages = vec![encode(&message)];
        let result = self.call(path, metadata, messages, RpcType::Unary, decoder.response_type()).await?;
        Ok(UnaryCall::new(result, decoder))
    }

    pub async fn server_streaming<M, D>(
        &mut self,
        path: &str,
        request: tonic::Request<M>,
        decoder: D,
    ) -> VcrResult<StreamingCall<D::Item>>
    where
        M: prost::Message,
        D: Decoder + Send + 'static,
        D::Item: 'static,
    {
        let (metadata, _extensions, message) = request.into_parts();
        let messages = vec![encode(&message)];
        let result = self.call(path, metadata, messages, RpcType::ServerStreaming, decoder.response_type()).await?;
        Ok(StreamingCall::new(result, decoder))
    }

    /// The request stream is drained before anything is sent, so it must end.
    pub async fn client_streaming<St, D>(
        &mut self,
        path: &str,
        request: tonic::Request<St>,
        decoder: D,
    ) -> VcrResult<UnaryCall<D::Item>>
    where
        St: Stream,
        St::Item: prost::Message,
        D: Decoder,
    {
        let (metadata, _extensions, stream) = request.into_parts();
        let messages = stream.map(|message| encode(&message)).collect().await;
        let result = self.call(path, metadata, messages, RpcType::ClientStreaming, decoder.response_type()).await?;
        Ok(UnaryCall::new(result, decoder))
    }

    /// The request stream is drained before anything is sent, so it must end.
    pub async fn bidi_streaming<St, D>(
        &mut self,
        path: &str,
        request: tonic::Request<St>,
        decoder: D,
    ) -> VcrResult<StreamingCall<D::Item>>
    where
        St: Stream,
        St::Item: prost::Message,
        D: Decoder + Send + 'static,
        D::Item: 'static,
    {
        let (metadata, _extensions, stream) = request.into_parts();
        let messages = stream.map(|message| encode(&message)).collect().await;
        let result = self.call(path, metadata, messages, RpcType::BidiStreaming, decoder.response_type()).await?;
        Ok(StreamingCall::new(result, decoder))
    }

    async fn call(
        &mut self,
        path: &str,
        metadata: MetadataMap,
        messages: Vec<Bytes>,
        rpc_type: RpcType,
        response_type: Option<String>,
    ) -> VcrResult<CallResult> {
        let call = OutgoingCall::new(request_head(path, metadata)?, messages)
            .with_rpc_type(rpc_type)
            .with_response_type(response_type);
        self.service.intercept(call).await
    }
}

fn encode<M: prost::Message>(message: &M) -> Bytes {
    message.encode_to_vec().into()
}

/// Head of a gRPC request to `path`, as a tonic client would send it.
pub fn request_head(path: &str, metadata: MetadataMap) -> VcrResult<Parts> {
    let invalid = || VcrError::InvalidMethod(path.to_string());
    if !path.starts_with('/') {
        return Err(invalid());
    }
    let path: PathAndQuery = path.parse().map_err(|_| invalid())?;

    let mut request = http::Request::new(());
    *request.method_mut() = Method::POST;
    *request.uri_mut() = Uri::from(path);
    *request.version_mut() = Version::HTTP_2;
    *request.headers_mut() = metadata.into_headers();
    request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    request.headers_mut().insert(TE, HeaderValue::from_static("trailers"));
    Ok(request.into_parts().0)
}

#[cfg(test)]
mod tests {
    use grpcvcr_dev_server::pb;

    use super::*;

    #[test]
    fn test_request_head() {
        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", "Bearer token".parse().unwrap());

        let head = request_head(pb::methods::GET_USER, metadata).unwrap();
        assert_eq!(head.method, Method::POST);
        assert_eq!(head.uri.path(), "/users.Users/GetUser");
        assert_eq!(head.headers.get("authorization").unwrap(), "Bearer token");
        assert_eq!(head.headers.get(CONTENT_TYPE).unwrap(), "application/grpc");
        assert_eq!(head.headers.get(TE).unwrap(), "trailers");
    }

    #[test]
    fn test_request_head_rejects_invalid_path() {
        assert!(matches!(request_head("users.Users/GetUser", MetadataMap::new()), Err(VcrError::InvalidMethod(_))));
        assert!(matches!(request_head("/users Users", MetadataMap::new()), Err(VcrError::InvalidMethod(_))));
    }
}
