use std::marker::PhantomData;

use bytes::Bytes;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::Status;

/// Turns recorded response bytes back into messages.
///
/// `response_type` is the tag stored next to the recorded response, if any. [`Decoder::response_type`] is the
/// tag written when the response is recorded and nothing more specific is known about the method.
pub trait Decoder {
    type Item;

    fn decode(&mut self, response_type: Option<&str>, bytes: Bytes) -> Result<Self::Item, Status>;

    fn response_type(&self) -> Option<String> {
        None
    }
}

/// Decodes into a statically known prost message.
#[derive(Debug)]
pub struct ProstDecoder<M>(PhantomData<fn() -> M>);
impl<M> ProstDecoder<M> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}
impl<M> Default for ProstDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M> Clone for ProstDecoder<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}
impl<M: prost::Message + Default> Decoder for ProstDecoder<M> {
    type Item = M;

    fn decode(&mut self, response_type: Option<&str>, bytes: Bytes) -> Result<Self::Item, Status> {
        let expected = std::any::type_name::<M>();
        if let Some(tag) = response_type {
            let name = tag.rsplit(['.', ':']).next().unwrap_or(tag);
            if !expected.ends_with(name) {
                tracing::warn!(tag, expected, "recorded response type differs from the decoded type");
            }
        }
        M::decode(bytes).map_err(|e| Status::internal(format!("failed to decode recorded {expected}: {e}")))
    }

    fn response_type(&self) -> Option<String> {
        Some(std::any::type_name::<M>().to_string())
    }
}

/// Decodes into [`DynamicMessage`]s, looking the recorded type up in a descriptor pool.
#[derive(Debug, Clone)]
pub struct DynamicDecoder {
    pool: DescriptorPool,
    fallback: MessageDescriptor,
    output: Option<MessageDescriptor>,
}
impl DynamicDecoder {
    /// `fallback` is used when the recorded tag is absent or unknown to `pool`.
    pub fn new(pool: DescriptorPool, fallback: MessageDescriptor) -> Self {
        Self { pool, fallback, output: None }
    }

    /// Decoder for the responses of `method`. Untagged responses fall back to the request message type, which is only
    /// a guess.
    pub fn for_method(method: &MethodDescriptor) -> Self {
        let input = method.input();
        Self { pool: input.parent_pool().clone(), fallback: input, output: Some(method.output()) }
    }

    fn descriptor(&self, response_type: Option<&str>) -> MessageDescriptor {
        match response_type {
            Some(tag) => self.pool.get_message_by_name(tag).unwrap_or_else(|| {
                tracing::warn!(tag, fallback = self.fallback.full_name(), "unknown recorded response type");
                self.fallback.clone()
            }),
            None => self.fallback.clone(),
        }
    }
}
impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;

    fn decode(&mut self, response_type: Option<&str>, bytes: Bytes) -> Result<Self::Item, Status> {
        let descriptor = self.descriptor(response_type);
        DynamicMessage::decode(descriptor.clone(), bytes)
            .map_err(|e| Status::internal(format!("failed to decode recorded {}: {e}", descriptor.full_name())))
    }

    fn response_type(&self) -> Option<String> {
        self.output.as_ref().map(|output| output.full_name().to_string())
    }
}
