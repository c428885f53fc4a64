//! Messages and service glue generated from `proto/users.proto`.

tonic::include_proto!("users");

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("users_descriptor");

pub const SERVICE_NAME: &str = "users.Users";

pub mod methods {
    pub const GET_USER: &str = "/users.Users/GetUser";
    pub const LIST_USERS: &str = "/users.Users/ListUsers";
    pub const CREATE_USERS: &str = "/users.Users/CreateUsers";
    pub const CHAT: &str = "/users.Users/Chat";
}
