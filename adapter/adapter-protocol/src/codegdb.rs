#![allow(non_camel_case_types)]

pub use crate::dap::{
    Breakpoint, Capabilities, ContinueArguments, ContinueResponseBody, ContinuedEventBody,
    InitializeRequestArguments, NextArguments, OutputEventBody, Scope, ScopesArguments,
    ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody, Source,
    SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody, StepInArguments,
    StepOutArguments, StoppedEventBody, TerminateArguments, TerminatedEventBody, Variable,
    VariablesArguments, VariablesResponseBody,
};

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProtocolMessage {
    pub seq: u32,
    #[serde(flatten)]
    pub type_: ProtocolMessageType,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ProtocolMessageType {
    #[serde(rename = "request")]
    Request(Request),
    #[serde(rename = "response")]
    Response(Response),
    #[serde(rename = "event")]
    Event(EventBody),
}

/// A request either matches one of the recognized commands, or is captured
/// with its command name so the session can report it as unsupported.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Request {
    Known(RequestArguments),
    Unknown(UnknownRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnknownRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "command", content = "arguments")]
pub enum RequestArguments {
    initialize(InitializeRequestArguments),
    setBreakpoints(SetBreakpointsArguments),
    configurationDone(Option<NoArguments>),
    #[serde(rename = "continue")]
    continue_(ContinueArguments),
    next(NextArguments),
    stepIn(StepInArguments),
    stepOut(StepOutArguments),
    stackTrace(StackTraceArguments),
    scopes(ScopesArguments),
    variables(VariablesArguments),
    terminate(Option<TerminateArguments>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub request_seq: u32,
    pub success: bool,
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ResponseResult {
    Success {
        #[serde(flatten)]
        body: ResponseBody,
    },
    Error {
        command: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        show_user: Option<bool>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "command", content = "body")]
pub enum ResponseBody {
    initialize(Capabilities),
    setBreakpoints(SetBreakpointsResponseBody),
    configurationDone,
    #[serde(rename = "continue")]
    continue_(ContinueResponseBody),
    next,
    stepIn,
    stepOut,
    stackTrace(StackTraceResponseBody),
    scopes(ScopesResponseBody),
    variables(VariablesResponseBody),
    terminate,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "body")]
pub enum EventBody {
    initialized,
    output(OutputEventBody),
    continued(ContinuedEventBody),
    stopped(StoppedEventBody),
    terminated(TerminatedEventBody),
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct NoArguments {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProtocolMessage {
        serde_json::from_str::<ProtocolMessage>(json).unwrap()
    }

    #[test]
    fn request_roundtrip() {
        let msg = parse(
            r#"{"seq":3,"type":"request","command":"continue","arguments":{"threadId":1}}"#,
        );
        match &msg.type_ {
            ProtocolMessageType::Request(Request::Known(RequestArguments::continue_(args))) => {
                assert_eq!(args.thread_id, 1)
            }
            other => panic!("{:?}", other),
        }
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["command"], "continue");
        assert_eq!(json["arguments"]["threadId"], 1);
    }

    #[test]
    fn unknown_request_keeps_command() {
        let msg = parse(r#"{"seq":9,"type":"request","command":"readMemory","arguments":{}}"#);
        match &msg.type_ {
            ProtocolMessageType::Request(Request::Unknown(req)) => {
                assert_eq!(req.command, "readMemory")
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn event_serialization() {
        let msg = ProtocolMessage {
            seq: 1,
            type_: ProtocolMessageType::Event(EventBody::stopped(StoppedEventBody {
                reason: "breakpoint".into(),
                thread_id: Some(1),
                all_threads_stopped: Some(true),
                ..Default::default()
            })),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "stopped");
        assert_eq!(json["body"]["reason"], "breakpoint");
    }

    #[test]
    fn error_response_serialization() {
        let msg = ProtocolMessage {
            seq: 2,
            type_: ProtocolMessageType::Response(Response {
                request_seq: 9,
                success: false,
                result: ResponseResult::Error {
                    command: "readMemory".into(),
                    message: "readMemory is not yet supported".into(),
                    show_user: Some(true),
                },
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "readMemory is not yet supported");
    }

    #[test]
    fn configuration_done_without_arguments() {
        let msg = parse(r#"{"seq":4,"type":"request","command":"configurationDone"}"#);
        assert!(matches!(
            msg.type_,
            ProtocolMessageType::Request(Request::Known(RequestArguments::configurationDone(None)))
        ));
    }
}
