use crate::prelude::*;

use adapter_protocol::ProtocolMessage;
use bytes::BytesMut;
use std::fmt::Write;
use std::io;
use std::str;
use tokio_util::codec;

/// DAP's `Content-Length: N\r\n\r\n<json>` framing.
pub struct DAPCodec {
    state: State,
    content_len: usize,
}

enum State {
    ReadingHeaders,
    ReadingBody,
}

impl DAPCodec {
    pub fn new() -> DAPCodec {
        DAPCodec {
            state: State::ReadingHeaders,
            content_len: 0,
        }
    }
}

pub type DecoderResult = Result<ProtocolMessage, DecoderError>;

/// A complete frame whose body did not deserialize. The raw value is kept
/// so the dispatcher can still answer with an error response.
#[derive(Debug)]
pub enum DecoderError {
    SerdeError {
        error: serde_json::error::Error,
        value: serde_json::value::Value,
    },
}

impl codec::Decoder for DAPCodec {
    type Item = DecoderResult;
    type Error = io::Error;

    fn decode(&mut self, buffer: &mut BytesMut) -> Result<Option<DecoderResult>, Self::Error> {
        loop {
            match self.state {
                State::ReadingHeaders => match buffer.windows(2).position(|b| b == b"\r\n") {
                    None => return Ok(None),
                    Some(pos) => {
                        let line = buffer.split_to(pos + 2);
                        if line.len() == 2 {
                            // Blank line: headers are over.
                            self.state = State::ReadingBody;
                        } else if let Ok(line) = str::from_utf8(&line) {
                            let header = "Content-Length:";
                            if line.len() > header.len()
                                && line[..header.len()].eq_ignore_ascii_case(header)
                            {
                                if let Ok(content_len) = line[header.len()..].trim().parse() {
                                    self.content_len = content_len;
                                }
                            }
                        }
                    }
                },
                State::ReadingBody => {
                    if buffer.len() < self.content_len {
                        return Ok(None);
                    }
                    let body = buffer.split_to(self.content_len);
                    self.state = State::ReadingHeaders;
                    self.content_len = 0;

                    debug!("--> {}", String::from_utf8_lossy(&body));
                    match serde_json::from_slice(&body) {
                        Ok(message) => return Ok(Some(Ok(message))),
                        Err(error) => {
                            let value = serde_json::from_slice(&body)
                                .unwrap_or(serde_json::value::Value::Null);
                            return Ok(Some(Err(DecoderError::SerdeError { error, value })));
                        }
                    }
                }
            }
        }
    }
}

impl codec::Encoder<ProtocolMessage> for DAPCodec {
    type Error = io::Error;

    fn encode(&mut self, message: ProtocolMessage, buffer: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&message)?;
        debug!("<-- {}", String::from_utf8_lossy(&body));

        buffer.reserve(32 + body.len());
        write!(buffer, "Content-Length: {}\r\n\r\n", body.len()).unwrap();
        buffer.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_protocol::*;
    use tokio_util::codec::{Decoder, Encoder};

    fn frame(json: &str) -> BytesMut {
        BytesMut::from(format!("Content-Length: {}\r\n\r\n{}", json.len(), json).as_str())
    }

    #[test]
    fn decodes_a_complete_frame() {
        let mut codec = DAPCodec::new();
        let mut buffer = frame(r#"{"seq":1,"type":"request","command":"initialize","arguments":{"adapterID":"codegdb"}}"#);
        let message = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        assert_eq!(message.seq, 1);
        assert!(matches!(
            message.type_,
            ProtocolMessageType::Request(Request::Known(RequestArguments::initialize(_)))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn reassembles_split_frames() {
        let json = r#"{"seq":2,"type":"request","command":"stackTrace","arguments":{"threadId":1}}"#;
        let full = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);
        let (a, b) = full.split_at(20);

        let mut codec = DAPCodec::new();
        let mut buffer = BytesMut::from(a);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b.as_bytes());
        let message = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        assert_eq!(message.seq, 2);
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = DAPCodec::new();
        let mut buffer = frame(r#"{"seq":1,"type":"request","command":"configurationDone"}"#);
        buffer.extend_from_slice(&frame(
            r#"{"seq":2,"type":"request","command":"continue","arguments":{"threadId":1}}"#,
        ));
        let first = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        let second = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
    }

    #[test]
    fn malformed_body_keeps_the_raw_value() {
        let mut codec = DAPCodec::new();
        let mut buffer = frame(r#"{"seq":"not a number","type":"bogus"}"#);
        match codec.decode(&mut buffer).unwrap().unwrap() {
            Err(DecoderError::SerdeError { value, .. }) => {
                assert_eq!(value["type"], "bogus");
            }
            Ok(_) => panic!("expected a decode error"),
        }
    }

    #[test]
    fn encodes_with_content_length() {
        let mut codec = DAPCodec::new();
        let mut buffer = BytesMut::new();
        let message = ProtocolMessage {
            seq: 1,
            type_: ProtocolMessageType::Event(EventBody::initialized),
        };
        codec.encode(message, &mut buffer).unwrap();
        let text = String::from_utf8_lossy(&buffer).into_owned();
        let body = text.split("\r\n\r\n").nth(1).unwrap().to_owned();
        assert!(text.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert!(body.contains(r#""event":"initialized""#));

        // What we encode must decode back.
        let mut codec = DAPCodec::new();
        let decoded = codec.decode(&mut buffer).unwrap().unwrap().unwrap();
        assert!(matches!(
            decoded.type_,
            ProtocolMessageType::Event(EventBody::initialized)
        ));
    }
}
