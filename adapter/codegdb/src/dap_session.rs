use crate::prelude::*;

use crate::dap_codec::{DecoderError, DecoderResult};
use adapter_protocol::*;
use futures::prelude::*;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};

pub trait DAPChannel:
    Stream<Item = Result<DecoderResult, io::Error>> + Sink<ProtocolMessage, Error = io::Error> + Send
{
}

impl<T> DAPChannel for T where
    T: Stream<Item = Result<DecoderResult, io::Error>> + Sink<ProtocolMessage, Error = io::Error> + Send
{
}

/// Routes messages between the framed client channel and the debug session:
/// incoming requests fan out through a broadcast, outgoing responses and
/// events funnel through one writer that assigns sequence numbers.
#[derive(Clone)]
pub struct DAPSession {
    out_sender: Arc<mpsc::Sender<ProtocolMessageType>>,
    requests_sender: Weak<broadcast::Sender<(u32, Request)>>,
}

impl DAPSession {
    /// Returns the session handle and the dispatcher future; the future
    /// resolves when the client disconnects.
    pub fn new(channel: Box<dyn DAPChannel>) -> (DAPSession, impl Future<Output = ()> + Send) {
        let mut channel: Pin<Box<dyn DAPChannel>> = channel.into();
        let requests_sender = Arc::new(broadcast::channel::<(u32, Request)>(100).0);
        let (out_sender, mut out_receiver) = mpsc::channel(1000);
        let mut message_seq = 0u32;

        let session = DAPSession {
            out_sender: Arc::new(out_sender),
            requests_sender: Arc::downgrade(&requests_sender),
        };

        let dispatcher = async move {
            loop {
                tokio::select! {
                    maybe_message = channel.next() => {
                        match maybe_message {
                            Some(Ok(Ok(message))) => match message.type_ {
                                ProtocolMessageType::Request(request) => {
                                    log_errors!(requests_sender.send((message.seq, request)));
                                }
                                ProtocolMessageType::Response(_) | ProtocolMessageType::Event(_) => {
                                    debug!("Ignored a non-request message from the client");
                                }
                            },
                            Some(Ok(Err(DecoderError::SerdeError { error, value }))) => {
                                error!("Malformed message: {}", error);
                                // Try to fail the request rather than drop it.
                                if let Some(request_seq) =
                                    value.get("seq").and_then(|seq| seq.as_u64())
                                {
                                    message_seq += 1;
                                    let response = ProtocolMessage {
                                        seq: message_seq,
                                        type_: ProtocolMessageType::Response(Response {
                                            request_seq: request_seq as u32,
                                            success: false,
                                            result: ResponseResult::Error {
                                                command: String::new(),
                                                message: "Malformed message".into(),
                                                show_user: None,
                                            },
                                        }),
                                    };
                                    log_errors!(channel.send(response).await);
                                }
                            }
                            Some(Err(err)) => {
                                error!("Frame decoder error: {}", err);
                                break;
                            }
                            None => {
                                debug!("The client has disconnected");
                                break;
                            }
                        }
                    },
                    Some(message_type) = out_receiver.recv() => {
                        message_seq += 1;
                        let message = ProtocolMessage {
                            seq: message_seq,
                            type_: message_type,
                        };
                        log_errors!(channel.send(message).await);
                    }
                }
            }
        };

        (session, dispatcher)
    }

    pub fn subscribe_requests(&self) -> Result<broadcast::Receiver<(u32, Request)>, Error> {
        match self.requests_sender.upgrade() {
            Some(sender) => Ok(sender.subscribe()),
            None => Err(str_error("DAP session is gone")),
        }
    }

    pub async fn send_response(&self, response: Response) -> Result<(), Error> {
        self.out_sender
            .send(ProtocolMessageType::Response(response))
            .await
            .map_err(|_| str_error("DAP session is gone"))
    }

    pub fn try_send_response(&self, response: Response) -> Result<(), Error> {
        self.out_sender
            .try_send(ProtocolMessageType::Response(response))
            .map_err(|_| str_error("DAP session is gone"))
    }

    pub async fn send_event(&self, event_body: EventBody) -> Result<(), Error> {
        self.out_sender
            .send(ProtocolMessageType::Event(event_body))
            .await
            .map_err(|_| str_error("DAP session is gone"))
    }

    pub fn try_send_event(&self, event_body: EventBody) -> Result<(), Error> {
        self.out_sender
            .try_send(ProtocolMessageType::Event(event_body))
            .map_err(|_| str_error("DAP session is gone"))
    }
}
