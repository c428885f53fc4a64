#![cfg(feature = "yaml")]

use grpcvcr::{
    blocking::BlockingVcrClient,
    call::Call,
    client::VcrClient,
    config::Vcr,
    decode::{DynamicDecoder, ProstDecoder},
    error::VcrError,
    record_mode::RecordMode,
    registry::MethodRegistry,
};
use grpcvcr_dev_server::{
    pb::{self, users_server::UsersServer},
    service::users::UsersImpl,
};
use indoc::indoc;
use prost_reflect::{DescriptorPool, ReflectMessage, Value};
use tonic::{Code, Request};

fn pool() -> DescriptorPool {
    DescriptorPool::decode(pb::FILE_DESCRIPTOR_SET).unwrap()
}

fn create_requests() -> Vec<pb::CreateUserRequest> {
    (1..=3).map(|i| pb::CreateUserRequest { name: format!("user{i}"), email: format!("user{i}@example.com") }).collect()
}

#[tokio::test]
async fn test_async_client_every_shape() {
    let dir = tempfile::tempdir().unwrap();
    let users = UsersImpl::default();
    let vcr = Vcr::new(dir.path().join("async.yaml")).registry(MethodRegistry::from_pool(&pool()));
    let mut client = VcrClient::new(vcr.service(UsersServer::new(users.clone())).unwrap());

    for replayed in [false, true] {
        let call = client
            .unary(
                pb::methods::GET_USER,
                Request::new(pb::GetUserRequest { id: 4 }),
                ProstDecoder::<pb::GetUserResponse>::new(),
            )
            .await
            .unwrap();
        assert_eq!(call.is_replayed(), replayed);
        assert_eq!(call.code(), Code::Ok);
        assert_eq!(call.result().unwrap().user, Some(UsersImpl::user(4)));

        let call = client
            .server_streaming(
                pb::methods::LIST_USERS,
                Request::new(pb::ListUsersRequest { limit: 2, fail_after: 0 }),
                ProstDecoder::<pb::User>::new(),
            )
            .await
            .unwrap();
        let listed: Vec<_> = call.collect::<Result<_, _>>().unwrap();
        assert_eq!(listed, vec![UsersImpl::user(1), UsersImpl::user(2)]);

        let requests = futures::stream::iter(create_requests());
        let call = client
            .client_streaming(
                pb::methods::CREATE_USERS,
                Request::new(requests),
                ProstDecoder::<pb::CreateUsersResponse>::new(),
            )
            .await
            .unwrap();
        assert_eq!(call.into_result().unwrap().created_count, 3);

        let messages = futures::stream::iter(["ping"].map(|content| pb::ChatMessage {
            sender: "client".to_string(),
            content: content.to_string(),
            timestamp: 7,
        }));
        let mut call = client
            .bidi_streaming(pb::methods::CHAT, Request::new(messages), ProstDecoder::<pb::ChatMessage>::new())
            .await
            .unwrap();
        let echo = call.message().await.unwrap().unwrap();
        assert_eq!((echo.content.as_str(), echo.timestamp), ("Echo: ping", 7));
        assert_eq!(call.message().await.unwrap(), None);
    }
    assert_eq!(users.calls(), 4);
    assert_eq!(client.cassette().len(), 4);
}

#[test]
fn test_blocking_and_async_clients_read_the_same_cassette() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.yaml");
    let users = UsersImpl::default();

    let service = Vcr::new(&path).service(UsersServer::new(users.clone())).unwrap();
    let mut blocking = BlockingVcrClient::new(service).unwrap();
    let request = pb::ListUsersRequest { limit: 4, fail_after: 3 };
    let recorded: Vec<_> = blocking
        .server_streaming(pb::methods::LIST_USERS, Request::new(request.clone()), ProstDecoder::<pb::User>::new())
        .unwrap()
        .collect();
    let created = blocking
        .client_streaming(
            pb::methods::CREATE_USERS,
            Request::new(create_requests()),
            ProstDecoder::<pb::CreateUsersResponse>::new(),
        )
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(created.ids, vec![1, 2, 3]);
    blocking.save().unwrap();
    assert_eq!(users.calls(), 2);

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let replayed: Vec<_> = rt.block_on(async {
        let service = Vcr::new(&path).record_mode(RecordMode::None).service(UsersServer::new(users.clone())).unwrap();
        let mut client = VcrClient::new(service);
        let call = client
            .server_streaming(pb::methods::LIST_USERS, Request::new(request), ProstDecoder::<pb::User>::new())
            .await
            .unwrap();
        assert!(call.is_replayed());
        assert_eq!(call.code(), Code::Internal);
        assert_eq!(call.details(), Some("stream failed"));
        call.collect()
    });
    assert_eq!(users.calls(), 2);

    assert_eq!(recorded.len(), 4);
    assert_eq!(recorded.len(), replayed.len());
    for (recorded, replayed) in recorded.iter().zip(&replayed) {
        match (recorded, replayed) {
            (Ok(recorded), Ok(replayed)) => assert_eq!(recorded, replayed),
            (Err(recorded), Err(replayed)) => {
                assert_eq!(recorded.code(), replayed.code());
                assert_eq!(recorded.message(), replayed.message());
            }
            _ => panic!("recorded {recorded:?} but replayed {replayed:?}"),
        }
    }
    assert!(replayed[3].is_err());
}

#[test]
fn test_blocking_none_mode_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    std::fs::write(&path, "").unwrap();
    let users = UsersImpl::default();

    let service = Vcr::new(&path).record_mode(RecordMode::None).service(UsersServer::new(users.clone())).unwrap();
    let mut client = BlockingVcrClient::new(service).unwrap();
    let err = client
        .unary(
            pb::methods::GET_USER,
            Request::new(pb::GetUserRequest { id: 1 }),
            ProstDecoder::<pb::GetUserResponse>::new(),
        )
        .unwrap_err();
    assert!(matches!(err, VcrError::RecordingDisabled { method } if method == pb::methods::GET_USER));
    assert_eq!(users.calls(), 0);
}

#[tokio::test]
async fn test_replay_handwritten_cassette_with_dynamic_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handwritten.yaml");
    let content = indoc! {"
        version: 1
        interactions:
          - request:
              method: /users.Users/GetUser
              body: CAE=
            response:
              body: Ch0IARIGVXNlciAxGhF1c2VyMUBleGFtcGxlLmNvbQ==
              code: OK
              response_type: users.GetUserResponse
            rpc_type: unary
          - request:
              method: /users.Users/ListUsers
              body: CAIQAQ==
            response:
              messages:
                - CAESBlVzZXIgMRoRdXNlcjFAZXhhbXBsZS5jb20=
              code: INTERNAL
              details: stream failed
              trailing_metadata:
                x-error-reason: [limit]
              response_type: users.User
            rpc_type: server_streaming
    "};
    std::fs::write(&path, content).unwrap();

    let users = UsersImpl::default();
    let service = Vcr::new(&path).record_mode(RecordMode::None).service(UsersServer::new(users.clone())).unwrap();
    let mut client = VcrClient::new(service);
    let service = pool().get_service_by_name(pb::SERVICE_NAME).unwrap();
    let method = |name: &str| service.methods().find(|m| m.name() == name).unwrap();

    let call = client
        .unary(
            pb::methods::GET_USER,
            Request::new(pb::GetUserRequest { id: 1 }),
            DynamicDecoder::for_method(&method("GetUser")),
        )
        .await
        .unwrap();
    let response = call.into_result().unwrap();
    assert_eq!(response.descriptor().full_name(), "users.GetUserResponse");
    let user = response.get_field_by_name("user").unwrap();
    let user = user.as_message().unwrap();
    assert_eq!(user.get_field_by_name("name").unwrap().as_ref(), &Value::String("User 1".to_string()));

    let mut call = client
        .server_streaming(
            pb::methods::LIST_USERS,
            Request::new(pb::ListUsersRequest { limit: 2, fail_after: 1 }),
            DynamicDecoder::for_method(&method("ListUsers")),
        )
        .await
        .unwrap();
    assert!(!call.cancel());
    assert!(call.done());
    assert!(!call.is_active());
    assert_eq!(call.time_remaining(), None);
    assert_eq!(call.trailing_metadata().get("x-error-reason").unwrap(), "limit");

    let first = call.next().unwrap().unwrap();
    assert_eq!(first.get_field_by_name("id").unwrap().as_ref(), &Value::I64(1));
    let status = call.next().unwrap().unwrap_err();
    assert_eq!((status.code(), status.message()), (Code::Internal, "stream failed"));
    assert!(call.next().is_none());
    assert_eq!(users.calls(), 0);
}

#[tokio::test]
async fn test_all_mode_dynamic_decoder_uses_response_type() {
    let dir = tempfile::tempdir().unwrap();
    let users = UsersImpl::default();
    let vcr = Vcr::new(dir.path().join("all.yaml")).record_mode(RecordMode::All);
    let mut client = VcrClient::new(vcr.service(UsersServer::new(users.clone())).unwrap());
    let pool = pool();
    let method = pool.get_service_by_name(pb::SERVICE_NAME).unwrap().methods().find(|m| m.name() == "GetUser").unwrap();

    for _ in 0..2 {
        let call = client
            .unary(
                pb::methods::GET_USER,
                Request::new(pb::GetUserRequest { id: 1 }),
                DynamicDecoder::for_method(&method),
            )
            .await
            .unwrap();
        assert!(!call.is_replayed());
        let response = call.into_result().unwrap();
        assert_eq!(response.descriptor().full_name(), "users.GetUserResponse");
        let user = response.get_field_by_name("user").unwrap();
        let name = user.as_message().unwrap().get_field_by_name("name").unwrap();
        assert_eq!(name.as_ref(), &Value::String("User 1".to_string()));
    }
    assert_eq!(users.calls(), 2);
    assert_eq!(client.cassette().len(), 1);
}
