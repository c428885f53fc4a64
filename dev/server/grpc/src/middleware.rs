pub mod logging {
    use std::{
        fmt::Display,
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    };

    use tower::{Layer, Service};

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
    pub struct LoggingLayer;
    impl<S> Layer<S> for LoggingLayer {
        type Service = LoggingService<S>;

        fn layer(&self, service: S) -> Self::Service {
            LoggingService { inner: service }
        }
    }

    /// Logs the path of every request and the grpc-status of trailers-only responses.
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
    pub struct LoggingService<S> {
        inner: S,
    }
    impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for LoggingService<S>
    where
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Display,
    {
        type Response = S::Response;
        type Error = S::Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

        fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.inner.poll_ready(cx)
        }

        fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
            let path = req.uri().path().to_string();
            tracing::info!(path = %path, "request");
            let fut = self.inner.call(req);
            Box::pin(async move {
                match fut.await {
                    Ok(res) => {
                        let grpc_status = res.headers().get("grpc-status").and_then(|v| v.to_str().ok());
                        tracing::info!(path = %path, http_status = %res.status(), grpc_status, "response");
                        Ok(res)
                    }
                    Err(e) => {
                        tracing::error!(path = %path, "{}", e);
                        Err(e)
                    }
                }
            })
        }
    }

}
