//! gRPC length-prefixed message framing: one compression flag byte, a big-endian `u32` length, then the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame};
use http_body_util::{BodyExt, StreamBody};

use crate::error::{BoxError, VcrError, VcrResult};

pub const HEADER_LEN: usize = 5;

pub fn encode_message(buf: &mut BytesMut, message: &[u8]) -> VcrResult<()> {
    let len = message_len(message.len())?;
    buf.reserve(HEADER_LEN + message.len());
    buf.put_u8(0);
    buf.put_u32(len);
    buf.put_slice(message);
    Ok(())
}

fn message_len(len: usize) -> VcrResult<u32> {
    u32::try_from(len).map_err(|_| VcrError::InvalidFrame(format!("{len} bytes do not fit in a frame")))
}

pub fn encode(messages: &[Bytes]) -> VcrResult<Bytes> {
    let mut buf = BytesMut::new();
    for message in messages {
        encode_message(&mut buf, message)?;
    }
    Ok(buf.freeze())
}

/// Split a fully drained body into message payloads. Compressed messages are not supported.
pub fn decode(mut buf: Bytes) -> VcrResult<Vec<Bytes>> {
    let mut messages = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < HEADER_LEN {
            return Err(VcrError::InvalidFrame(format!("{} trailing bytes are shorter than a frame header", buf.len())));
        }
        let compressed = buf.get_u8();
        let len = buf.get_u32() as usize;
        if compressed != 0 {
            return Err(VcrError::InvalidFrame("compressed messages cannot be recorded".to_string()));
        }
        if buf.remaining() < len {
            return Err(VcrError::InvalidFrame(format!("frame declares {len} bytes but only {} remain", buf.len())));
        }
        messages.push(buf.split_to(len));
    }
    Ok(messages)
}

pub fn concat(messages: &[Bytes]) -> Bytes {
    match messages {
        [] => Bytes::new(),
        [message] => message.clone(),
        messages => messages.concat().into(),
    }
}

/// Drain `body` completely, returning its bytes and trailers.
pub async fn collect<B>(body: B) -> VcrResult<(Bytes, Option<HeaderMap>)>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let collected = body.collect().await.map_err(|e| VcrError::Body(e.into()))?;
    let trailers = collected.trailers().cloned();
    Ok((collected.to_bytes(), trailers))
}

/// Body yielding one data frame per message and then the trailers, if any. A message too large to frame ends the
/// body with an error.
pub fn body(messages: &[Bytes], trailers: Option<HeaderMap>) -> tonic::body::Body {
    let mut frames: Vec<VcrResult<Frame<Bytes>>> = messages
        .iter()
        .map(|message| {
            let mut buf = BytesMut::new();
            encode_message(&mut buf, message)?;
            Ok(Frame::data(buf.freeze()))
        })
        .collect();
    frames.extend(trailers.map(|trailers| Ok(Frame::trailers(trailers))));
    tonic::body::Body::new(StreamBody::new(futures::stream::iter(frames)))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_decode_splits_messages() {
        let messages = vec![Bytes::from_static(b"first"), Bytes::new(), Bytes::from_static(b"third")];
        let encoded = encode(&messages).unwrap();
        assert_eq!(encoded.len(), 3 * HEADER_LEN + 10);
        assert_eq!(&encoded[..HEADER_LEN], &[0, 0, 0, 0, 5]);
        assert_eq!(decode(encoded).unwrap(), messages);
        assert_eq!(decode(Bytes::new()).unwrap(), Vec::<Bytes>::new());
    }

    #[test]
    fn test_decode_rejects_broken_frames() {
        assert!(matches!(decode(Bytes::from_static(&[0, 0, 0])), Err(VcrError::InvalidFrame(_))));
        assert!(matches!(decode(Bytes::from_static(&[0, 0, 0, 0, 9, 1])), Err(VcrError::InvalidFrame(_))));
        assert!(matches!(decode(Bytes::from_static(&[1, 0, 0, 0, 1, 1])), Err(VcrError::InvalidFrame(_))));
    }

    #[test]
    fn test_message_len_fits_u32() {
        assert_eq!(message_len(7).unwrap(), 7);
        assert_eq!(message_len(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(message_len(u32::MAX as usize + 1), Err(VcrError::InvalidFrame(_))));
    }

    #[test]
    fn test_concat() {
        assert_eq!(concat(&[]), Bytes::new());
        assert_eq!(concat(&[Bytes::from_static(b"ab")]), Bytes::from_static(b"ab"));
        assert_eq!(concat(&[Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn test_body_yields_trailers_last() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("13"));
        let messages = vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")];

        let (bytes, collected_trailers) = collect(body(&messages, Some(trailers.clone()))).await.unwrap();
        assert_eq!(decode(bytes).unwrap(), messages);
        assert_eq!(collected_trailers, Some(trailers));

        let mut body = body(&messages, None);
        let mut kinds = Vec::new();
        while let Some(frame) = body.frame().await {
            kinds.push(frame.unwrap().is_data());
        }
        assert_eq!(kinds, vec![true, true]);
    }
}
