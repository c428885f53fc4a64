use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::{stream::BoxStream, StreamExt};
use tonic::{
    metadata::{MetadataMap, MetadataValue},
    Code, Request, Response, Status, Streaming,
};

use crate::pb::{
    users_server::Users, ChatMessage, CreateUserRequest, CreateUsersResponse, GetUserRequest, GetUserResponse,
    ListUsersRequest, User,
};

/// Users backend counting every call it serves, so tests can tell a replay from a live call.
#[derive(Debug, Clone, Default)]
pub struct UsersImpl {
    calls: Arc<AtomicUsize>,
}

#[tonic::async_trait]
impl Users for UsersImpl {
    #[tracing::instrument(ret)]
    async fn get_user(&self, request: Request<GetUserRequest>) -> Result<Response<GetUserResponse>, Status> {
        self.count();
        let GetUserRequest { id } = request.into_inner();
        if id <= 0 {
            let mut metadata = MetadataMap::new();
            metadata.insert("x-error-reason", MetadataValue::from_static("invalid-id"));
            return Err(Status::with_metadata(Code::NotFound, format!("user {id} not found"), metadata));
        }
        Ok(Response::new(GetUserResponse { user: Some(Self::user(id)) }))
    }

    type ListUsersStream = BoxStream<'static, Result<User, Status>>;
    #[tracing::instrument]
    async fn list_users(&self, request: Request<ListUsersRequest>) -> Result<Response<Self::ListUsersStream>, Status> {
        self.count();
        let ListUsersRequest { limit, fail_after } = request.into_inner();
        let users = (1..=i64::from(limit)).map(|id| Ok(Self::user(id)));
        let stream: Vec<_> = if fail_after > 0 {
            users.take(fail_after as usize).chain([Err(Status::internal("stream failed"))]).collect()
        } else {
            users.collect()
        };
        Ok(Response::new(futures::stream::iter(stream).boxed()))
    }

    #[tracing::instrument]
    async fn create_users(
        &self,
        request: Request<Streaming<CreateUserRequest>>,
    ) -> Result<Response<CreateUsersResponse>, Status> {
        self.count();
        let mut stream = request.into_inner();
        let mut ids = Vec::new();
        while let Some(CreateUserRequest { name, email }) = stream.message().await? {
            let id = ids.len() as i64 + 1;
            tracing::debug!(id, %name, %email, "create user");
            ids.push(id);
        }
        Ok(Response::new(CreateUsersResponse { created_count: ids.len() as i32, ids }))
    }

    type ChatStream = BoxStream<'static, Result<ChatMessage, Status>>;
    #[tracing::instrument]
    async fn chat(&self, request: Request<Streaming<ChatMessage>>) -> Result<Response<Self::ChatStream>, Status> {
        self.count();
        let echo = request.into_inner().map(|message| {
            message.map(|ChatMessage { content, timestamp, .. }| ChatMessage {
                sender: "server".to_string(),
                content: format!("Echo: {content}"),
                timestamp,
            })
        });
        Ok(Response::new(echo.boxed()))
    }
}

impl UsersImpl {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn user(id: i64) -> User {
        User { id, name: format!("User {id}"), email: format!("user{id}@example.com") }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use crate::pb::{users_client::UsersClient, users_server::UsersServer};

    use super::*;

    #[tokio::test]
    async fn test_get_user() {
        let users = UsersImpl::default();

        let response = users.get_user(Request::new(GetUserRequest { id: 1 })).await.unwrap();
        assert_eq!(response.into_inner().user, Some(UsersImpl::user(1)));

        let status = users.get_user(Request::new(GetUserRequest { id: 0 })).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "user 0 not found");
        assert_eq!(status.metadata().get("x-error-reason").unwrap(), "invalid-id");
        assert_eq!(users.calls(), 2);
    }

    #[tokio::test]
    async fn test_list_users_fail_after() {
        let users = UsersImpl::default();

        let request = Request::new(ListUsersRequest { limit: 3, fail_after: 0 });
        let listed: Vec<_> = users.list_users(request).await.unwrap().into_inner().try_collect().await.unwrap();
        assert_eq!(listed, (1..=3).map(UsersImpl::user).collect::<Vec<_>>());

        let request = Request::new(ListUsersRequest { limit: 3, fail_after: 2 });
        let results: Vec<_> = users.list_users(request).await.unwrap().into_inner().collect().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap(), &UsersImpl::user(2));
        assert_eq!(results[2].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_streaming_methods_through_client() {
        let users = UsersImpl::default();
        let mut client = UsersClient::new(UsersServer::new(users.clone()));

        let requests =
            ["a", "b"].map(|name| CreateUserRequest { name: name.to_string(), email: format!("{name}@example.com") });
        let created = client.create_users(futures::stream::iter(requests)).await.unwrap().into_inner();
        assert_eq!(created, CreateUsersResponse { created_count: 2, ids: vec![1, 2] });

        let messages = ["hi", "bye"].map(|content| ChatMessage {
            sender: "client".to_string(),
            content: content.to_string(),
            timestamp: 1,
        });
        let echoed: Vec<_> =
            client.chat(futures::stream::iter(messages)).await.unwrap().into_inner().try_collect().await.unwrap();
        assert_eq!(echoed.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["Echo: hi", "Echo: bye"]);
        assert!(echoed.iter().all(|m| m.sender == "server"));

        assert_eq!(users.calls(), 2);
    }
}
