use tonic::transport::{server::Router, Server};
use tonic_health::{pb::health_server::HealthServer, server::HealthService};
use tower::layer::util::{Identity, Stack};

use crate::{middleware::logging::LoggingLayer, pb};

pub mod users;

pub type AppRouter = Router<Stack<LoggingLayer, Identity>>;

pub async fn app() -> Result<AppRouter, tonic_reflection::server::Error> {
    app_with(users::UsersImpl::default()).await
}
pub async fn app_with(users: users::UsersImpl) -> Result<AppRouter, tonic_reflection::server::Error> {
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<HealthServer<HealthService>>().await;
    health_reporter.set_serving::<pb::users_server::UsersServer<users::UsersImpl>>().await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(tonic_reflection::pb::v1::FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(pb::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Ok(router(users).add_service(health_service).add_service(reflection_service))
}
pub fn router(users: users::UsersImpl) -> AppRouter {
    Server::builder()
        .trace_fn(|_| tracing::info_span!(env!("CARGO_PKG_NAME")))
        .layer(LoggingLayer)
        .add_service(pb::users_server::UsersServer::new(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_registers_reflection() {
        assert!(app().await.is_ok());
    }
}
