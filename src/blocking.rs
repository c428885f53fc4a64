use std::sync::Arc;

use http_body::Body;
use tokio::runtime::{Builder, Runtime};
use tower::Service;

use crate::{
    call::{StreamingCall, UnaryCall},
    cassette::Cassette,
    client::VcrClient,
    decode::Decoder,
    error::{BoxError, VcrError, VcrResult},
    service::VcrService,
};

/// Blocking counterpart of [`VcrClient`], driving it on its own current thread runtime.
///
/// Calling any method from inside an async context panics, as [`Runtime::block_on`] does.
#[derive(Debug)]
pub struct BlockingVcrClient<S> {
    inner: VcrClient<S>,
    rt: Runtime,
}
impl<S> BlockingVcrClient<S> {
    pub fn new(service: VcrService<S>) -> VcrResult<Self> {
        let rt = Builder::new_current_thread().enable_all().build().map_err(VcrError::Runtime)?;
        Ok(Self { inner: VcrClient::new(service), rt })
    }

    pub fn cassette(&self) -> &Arc<Cassette> {
        self.inner.cassette()
    }

    pub fn save(&self) -> VcrResult<()> {
        self.inner.save()
    }

    pub fn into_async(self) -> VcrClient<S> {
        self.inner
    }
}
impl<S, B> BlockingVcrClient<S>
where
    S: Service<http::Request<tonic::body::Body>, Response = http::Response<B>>,
    S::Error: Into<BoxError>,
    B: Body,
    B::Error: Into<BoxError>,
{
    pub fn unary<M, D>(&mut self, path: &str, request: tonic::Request<M>, decoder: D) -> VcrResult<UnaryCall<D::Item>>
    where
        M: prost::Message,
        D: Decoder,
    {
        self.rt.block_on(self.inner.unary(path, request, decoder))
    }

    pub fn server_streaming<M, D>(
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
        self.rt.block_on(self.inner.server_streaming(path, request, decoder))
    }

    pub fn client_streaming<I, D>(
        &mut self,
        path: &str,
        request: tonic::Request<I>,
        decoder: D,
    ) -> VcrResult<UnaryCall<D::Item>>
    where
        I: IntoIterator,
        I::Item: prost::Message,
        D: Decoder,
    {
        let request = request.map(futures::stream::iter);
        self.rt.block_on(self.inner.client_streaming(path, request, decoder))
    }

    pub fn bidi_streaming<I, D>(
        &mut self,
        path: &str,
        request: tonic::Request<I>,
        decoder: D,
    ) -> VcrResult<StreamingCall<D::Item>>
    where
        I: IntoIterator,
        I::Item: prost::Message,
        D: Decoder + Send + 'static,
        D::Item: 'static,
    {
        let request = request.map(futures::stream::iter);
        self.rt.block_on(self.inner.bidi_streaming(path, request, decoder))
    }
}
