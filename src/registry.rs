use std::collections::HashMap;

use bytes::Buf;
use prost_reflect::{DescriptorPool, MethodDescriptor};

use crate::{error::VcrResult, interaction::RpcType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    pub rpc_type: RpcType,
    pub response_type: Option<String>,
}
impl MethodInfo {
    pub fn new(rpc_type: RpcType) -> Self {
        Self { rpc_type, response_type: None }
    }

    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = Some(response_type.into());
        self
    }
}
impl From<&MethodDescriptor> for MethodInfo {
    fn from(method: &MethodDescriptor) -> Self {
        Self::new(RpcType::from_streaming(method.is_client_streaming(), method.is_server_streaming()))
            .with_response_type(method.output().full_name())
    }
}

/// RPC shape and response message type of each known method path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodInfo>,
}
impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pool(pool: &DescriptorPool) -> Self {
        let mut registry = Self::new();
        for service in pool.services() {
            for method in service.methods() {
                registry.insert(method_path(&method), MethodInfo::from(&method));
            }
        }
        registry
    }

    /// Build from an encoded `FileDescriptorSet`, e.g. the one `tonic::include_file_descriptor_set!` embeds.
    pub fn from_file_descriptor_set<B: Buf>(bytes: B) -> VcrResult<Self> {
        let pool = DescriptorPool::decode(bytes)?;
        Ok(Self::from_pool(&pool))
    }

    pub fn insert(&mut self, path: impl Into<String>, info: MethodInfo) -> Option<MethodInfo> {
        self.methods.insert(path.into(), info)
    }

    pub fn with(mut self, path: impl Into<String>, info: MethodInfo) -> Self {
        self.insert(path, info);
        self
    }

    pub fn get(&self, path: &str) -> Option<&MethodInfo> {
        self.methods.get(path)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered info for `path`, or a shape guessed from how many messages went each way. Only a stream can carry
    /// zero or several messages.
    pub fn resolve(&self, path: &str, request_messages: usize, response_messages: usize) -> MethodInfo {
        match self.get(path) {
            Some(info) => info.clone(),
            None => {
                let rpc_type = RpcType::from_streaming(request_messages != 1, response_messages > 1);
                tracing::debug!(path, %rpc_type, "method is not registered, infer its shape");
                MethodInfo::new(rpc_type)
            }
        }
    }
}

pub fn method_path(method: &MethodDescriptor) -> String {
    format!("/{}/{}", method.parent_service().full_name(), method.name())
}

#[cfg(test)]
mod tests {
    use grpcvcr_dev_server::pb;

    use super::*;

    fn pool() -> DescriptorPool {
        DescriptorPool::decode(pb::FILE_DESCRIPTOR_SET).unwrap()
    }

    #[test]
    fn test_from_pool() {
        let registry = MethodRegistry::from_pool(&pool());

        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.get(pb::methods::GET_USER),
            Some(&MethodInfo::new(RpcType::Unary).with_response_type("users.GetUserResponse"))
        );
        assert_eq!(
            registry.get(pb::methods::LIST_USERS),
            Some(&MethodInfo::new(RpcType::ServerStreaming).with_response_type("users.User"))
        );
        assert_eq!(registry.get(pb::methods::CREATE_USERS).unwrap().rpc_type, RpcType::ClientStreaming);
        assert_eq!(registry.get(pb::methods::CHAT).unwrap().rpc_type, RpcType::BidiStreaming);
    }

    #[test]
    fn test_from_encoded_file_descriptor_set() {
        let registry = MethodRegistry::from_file_descriptor_set(pb::FILE_DESCRIPTOR_SET).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry, MethodRegistry::from_pool(&pool()));

        assert!(MethodRegistry::from_file_descriptor_set(&b"\xff\xff"[..]).is_err());
    }

    #[test]
    fn test_resolve_infers_unknown_methods() {
        let registry = MethodRegistry::new().with("/a.A/Stream", MethodInfo::new(RpcType::ServerStreaming));

        assert_eq!(registry.resolve("/a.A/Stream", 1, 1).rpc_type, RpcType::ServerStreaming);
        assert_eq!(registry.resolve("/a.A/Unknown", 1, 1), MethodInfo::new(RpcType::Unary));
        assert_eq!(registry.resolve("/a.A/Unknown", 1, 3).rpc_type, RpcType::ServerStreaming);
        assert_eq!(registry.resolve("/a.A/Unknown", 0, 1).rpc_type, RpcType::ClientStreaming);
        assert_eq!(registry.resolve("/a.A/Unknown", 2, 1).rpc_type, RpcType::ClientStreaming);
        assert_eq!(registry.resolve("/a.A/Unknown", 3, 3).rpc_type, RpcType::BidiStreaming);
    }
}
