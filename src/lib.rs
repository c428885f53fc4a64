//! Record and replay gRPC calls with cassettes.
//!
//! The first run of a test calls the real backend and records every interaction into a cassette file. Later runs
//! replay the cassette, so the backend is no longer needed.
//!
//! | record mode | matching interaction | no matching interaction |
//! | --- | --- | --- |
//! | `none` | replay | error, the backend is never called |
//! | `new_episodes` (default) | replay | call the backend and record |
//! | `all` | call the backend and overwrite | call the backend and record |
//! | `once` | replay | call the backend and record |
//!
//! # Usage
//! [`service::VcrService`] wraps any tower service speaking gRPC over HTTP, e.g. a `tonic::transport::Channel`, so
//! generated clients work unchanged.
#![cfg_attr(
    feature = "yaml",
    doc = r##"
 ```
 # tokio_test::block_on(async {
 use grpcvcr::{config::Vcr, record_mode::RecordMode};
 use grpcvcr_dev_server::{
     pb::{users_client::UsersClient, users_server::UsersServer, GetUserRequest},
     service::users::UsersImpl,
 };

 let dir = tempfile::tempdir().unwrap();
 let path = dir.path().join("get_user.yaml");

 let users = UsersImpl::default();
 let service = Vcr::new(&path).service(UsersServer::new(users.clone())).unwrap();
 let mut client = UsersClient::new(service.clone());
 let recorded = client.get_user(GetUserRequest { id: 1 }).await.unwrap();
 service.cassette().save().unwrap();

 let service = Vcr::new(&path).record_mode(RecordMode::None).service(UsersServer::new(users.clone())).unwrap();
 let replayed = UsersClient::new(service).get_user(GetUserRequest { id: 1 }).await.unwrap();
 assert_eq!(recorded.into_inner(), replayed.into_inner());
 assert_eq!(users.calls(), 1);
 # })
 ```
"##
)]
//!
//! [`client::VcrClient`] and [`blocking::BlockingVcrClient`] return call objects instead, which also tell whether
//! the call was replayed.

pub mod blocking;
pub mod call;
pub mod cassette;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod interaction;
pub mod matcher;
pub mod record_mode;
pub mod registry;
pub mod serialization;
pub mod service;

pub use blocking::BlockingVcrClient;
pub use call::{Call, CallResult, StreamingCall, UnaryCall};
pub use cassette::Cassette;
pub use client::VcrClient;
pub use config::{Vcr, VcrConfig};
pub use decode::{Decoder, DynamicDecoder, ProstDecoder};
pub use error::{VcrError, VcrResult};
pub use interaction::{Interaction, RpcType};
pub use matcher::Matcher;
pub use record_mode::RecordMode;
pub use registry::MethodRegistry;
pub use service::{VcrLayer, VcrService};
