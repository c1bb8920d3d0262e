mod variables;

use crate::prelude::*;

use crate::expander::{Expansion, VariableExpander};
use crate::handles::HandleMap;
use crate::mi2_codec::{Record, RecordKind};
use crate::mi2_output::{self, StopReason};
use crate::mi2_session::{Mi2Session, OPTION_TIMEOUT};
use crate::source_analyzer::SourceIndex;
use crate::status::{Status, StatusMachine};
use crate::step_filter::{StepFilter, StepVerdict};
use crate::{Language, SessionOptions};

use adapter_protocol::*;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dap_session::DAPSession;

/// The bridge debugs single-threaded student programs; stops are reported
/// against one fixed DAP thread.
const SINGLE_THREAD_ID: i64 = 1;

pub struct DebugSession {
    dap_session: DAPSession,
    options: SessionOptions,

    mi2: Arc<Mi2Session>,
    var_refs: Arc<HandleMap>,
    expander: VariableExpander,
    status: Arc<StatusMachine>,
    step_filter: StepFilter,

    breakpoint_numbers: tokio::sync::Mutex<Vec<String>>,
    /// The last exec command sent; the step filter needs it to pick its
    /// corrective command.
    pre_action: String,
    io_tasks: Vec<JoinHandle<()>>,
}

impl DebugSession {
    pub async fn run(
        dap_session: DAPSession,
        requests: broadcast::Receiver<(u32, Request)>,
        options: SessionOptions,
    ) -> Result<(), Error> {
        let (mi2, notifications) = Mi2Session::start(&options.exec_file).await?;

        let oracle = match &options.code_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(source) => match SourceIndex::parse(&source, options.language) {
                    Ok(index) => Some(index),
                    Err(err) => {
                        error!("source analysis failed: {}", err);
                        None
                    }
                },
                Err(err) => {
                    error!("cannot read {}: {}", path.display(), err);
                    None
                }
            },
            None => None,
        };

        let var_refs = Arc::new(HandleMap::new());
        let expansion = match options.language {
            Language::C => Expansion::C,
            Language::Cpp => Expansion::Cpp,
        };
        let expander = VariableExpander::new(mi2.clone(), var_refs.clone(), expansion, oracle);

        let workspace = options
            .exec_file
            .parent()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut session = DebugSession {
            dap_session,
            options,
            mi2,
            var_refs,
            expander,
            status: Arc::new(StatusMachine::new()),
            step_filter: StepFilter::new(workspace),
            breakpoint_numbers: tokio::sync::Mutex::new(Vec::new()),
            pre_action: String::new(),
            io_tasks: Vec::new(),
        };

        session.event_loop(requests, notifications).await;
        session.shutdown().await;
        debug!("End of the debug session");
        Ok(())
    }

    async fn event_loop(
        &mut self,
        mut requests: broadcast::Receiver<(u32, Request)>,
        mut notifications: mpsc::Receiver<Record>,
    ) {
        let mut notifications_done = false;

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Ok((seq, request)) => self.handle_request(seq, request).await,
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!("Missed {} requests", count)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                notification = notifications.recv(), if !notifications_done => match notification {
                    Some(record) => self.handle_notification(record).await,
                    None => {
                        // GDB's stdout is gone: either an orderly exit or a
                        // crashed child. Both end the debug session.
                        notifications_done = true;
                        if !self.status.is(Status::Finish) {
                            self.status.set(Status::Finish);
                            self.step_filter.reset();
                            self.send_event(EventBody::terminated(Default::default()));
                        }
                    }
                }
            }
        }
    }

    async fn handle_request(&mut self, seq: u32, request: Request) {
        match request {
            Request::Known(arguments) => {
                let result = self.handle_request_args(arguments).await;
                self.send_response(seq, result);
            }
            Request::Unknown(unknown) => {
                info!("Received an unknown command: {}", unknown.command);
                let response = Response {
                    request_seq: seq,
                    success: false,
                    result: ResponseResult::Error {
                        message: format!("{} is not yet supported", unknown.command),
                        command: unknown.command,
                        show_user: Some(true),
                    },
                };
                log_errors!(self.dap_session.try_send_response(response));
            }
        }
    }

    #[rustfmt::skip]
    async fn handle_request_args(&mut self, arguments: RequestArguments) -> Result<ResponseBody, Error> {
        match arguments {
            RequestArguments::initialize(args) =>
                self.handle_initialize(args)
                    .map(|r| ResponseBody::initialize(r)),
            RequestArguments::setBreakpoints(args) =>
                self.handle_set_breakpoints(args).await
                    .map(|r| ResponseBody::setBreakpoints(r)),
            RequestArguments::configurationDone(_) =>
                self.handle_configuration_done().await
                    .map(|_| ResponseBody::configurationDone),
            RequestArguments::continue_(args) =>
                self.handle_continue(args).await
                    .map(|r| ResponseBody::continue_(r)),
            RequestArguments::next(args) =>
                self.handle_next(args).await
                    .map(|_| ResponseBody::next),
            RequestArguments::stepIn(args) =>
                self.handle_step_in(args).await
                    .map(|_| ResponseBody::stepIn),
            RequestArguments::stepOut(args) =>
                self.handle_step_out(args).await
                    .map(|_| ResponseBody::stepOut),
            RequestArguments::stackTrace(args) =>
                self.handle_stack_trace(args).await
                    .map(|r| ResponseBody::stackTrace(r)),
            RequestArguments::scopes(args) =>
                self.handle_scopes(args)
                    .map(|r| ResponseBody::scopes(r)),
            RequestArguments::variables(args) =>
                self.handle_variables(args).await
                    .map(|r| ResponseBody::variables(r)),
            RequestArguments::terminate(_) =>
                self.handle_terminate().await
                    .map(|_| ResponseBody::terminate),
        }
    }

    fn handle_initialize(&mut self, _args: InitializeRequestArguments) -> Result<Capabilities, Error> {
        self.send_event(EventBody::initialized);
        Ok(self.make_capabilities())
    }

    fn make_capabilities(&self) -> Capabilities {
        Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(false),
            supports_conditional_breakpoints: Some(false),
            supports_hit_conditional_breakpoints: Some(false),
            supports_evaluate_for_hovers: Some(false),
            supports_set_variable: Some(false),
            supports_restart_frame: Some(false),
            supports_goto_targets_request: Some(false),
            supports_step_in_targets_request: Some(false),
            supports_completions_request: Some(false),
            supports_modules_request: Some(false),
            supports_restart_request: Some(false),
            supports_exception_options: Some(false),
            supports_value_formatting_options: Some(false),
            supports_exception_info_request: Some(false),
            support_terminate_debuggee: Some(false),
            supports_delayed_stack_trace_loading: Some(false),
            supports_log_points: Some(false),
            supports_terminate_request: Some(false),
            supports_data_breakpoints: Some(false),
            supports_read_memory_request: Some(false),
            supports_disassemble_request: Some(false),
            supports_cancel_request: Some(false),
            supports_stepping_granularity: Some(false),
        }
    }

    /// Replace this source's breakpoints: previously tracked native ids are
    /// deleted, then each requested line is inserted. The lock is held
    /// across clear+insert so concurrent requests cannot interleave.
    async fn handle_set_breakpoints(
        &mut self,
        args: SetBreakpointsArguments,
    ) -> Result<SetBreakpointsResponseBody, Error> {
        let source_path = args
            .source
            .path
            .clone()
            .ok_or_else(|| str_error("source path is required"))?;
        let requested = args.breakpoints.unwrap_or_default();

        let mut numbers = self.breakpoint_numbers.lock().await;
        for number in numbers.drain(..) {
            let _ = self
                .mi2
                .send_async(|_| {}, "break-delete", &[number])
                .await;
        }

        let mut breakpoints = Vec::new();
        for requested_bp in &requested {
            let location = format!("{}:{}", source_path, requested_bp.line);
            let inserted = self
                .mi2
                .send_with_timeout(OPTION_TIMEOUT, "break-insert", &[location])
                .await
                .and_then(Record::into_result);
            match inserted {
                Ok(record) => match mi2_output::parse_add_breakpoint(&record) {
                    Some(number) => {
                        let id = number.parse().ok();
                        numbers.push(number);
                        breakpoints.push(Breakpoint {
                            id,
                            verified: true,
                            line: Some(requested_bp.line),
                            source: Some(args.source.clone()),
                            ..Default::default()
                        });
                    }
                    None => breakpoints.push(Breakpoint {
                        verified: false,
                        line: Some(requested_bp.line),
                        ..Default::default()
                    }),
                },
                // One failed insertion does not fail the batch.
                Err(err) => {
                    error!("break-insert {}:{}: {}", source_path, requested_bp.line, err);
                    breakpoints.push(Breakpoint {
                        verified: false,
                        line: Some(requested_bp.line),
                        message: Some(err.to_string()),
                        ..Default::default()
                    });
                }
            }
        }
        Ok(SetBreakpointsResponseBody { breakpoints })
    }

    async fn handle_configuration_done(&mut self) -> Result<(), Error> {
        let language = match self.options.language {
            Language::C => "c",
            Language::Cpp => "c++",
        };
        let _ = self
            .mi2
            .send_with_timeout(
                OPTION_TIMEOUT,
                "gdb-set",
                &["language".to_string(), language.to_string()],
            )
            .await;

        self.pre_action = "exec-run".to_string();
        self.mi2.send_async(|_| {}, "exec-run", &[]).await?;
        self.start_io_pumps();
        Ok(())
    }

    async fn handle_continue(&mut self, _args: ContinueArguments) -> Result<ContinueResponseBody, Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序运行中，无法执行continue")));
        }
        self.pre_action = "exec-continue".to_string();
        self.mi2.send_async(|_| {}, "exec-continue", &[]).await?;
        Ok(ContinueResponseBody {
            all_threads_continued: Some(true),
        })
    }

    async fn handle_next(&mut self, _args: NextArguments) -> Result<(), Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序运行中，无法执行单步调试")));
        }
        self.pre_action = "exec-next".to_string();
        self.mi2.send_async(|_| {}, "exec-next", &[]).await
    }

    async fn handle_step_in(&mut self, _args: StepInArguments) -> Result<(), Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序运行中，无法执行单步调试")));
        }
        self.pre_action = "exec-step".to_string();
        self.mi2.send_async(|_| {}, "exec-step", &[]).await
    }

    async fn handle_step_out(&mut self, _args: StepOutArguments) -> Result<(), Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序运行中，无法执行单步调试")));
        }
        self.pre_action = "exec-finish".to_string();
        self.mi2.send_async(|_| {}, "exec-finish", &[]).await
    }

    async fn handle_stack_trace(
        &mut self,
        _args: StackTraceArguments,
    ) -> Result<StackTraceResponseBody, Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序未暂停无法获取栈帧信息")));
        }
        let record = self
            .mi2
            .send_with_timeout(OPTION_TIMEOUT, "stack-list-frames", &[])
            .await?
            .into_result()?;
        let frames = mi2_output::parse_stack_trace(&record);
        Ok(StackTraceResponseBody {
            total_frames: Some(frames.len() as i64),
            stack_frames: frames,
        })
    }

    /// Idempotent: terminating a finished session is a no-op.
    async fn handle_terminate(&mut self) -> Result<(), Error> {
        if self.status.is(Status::Finish) {
            return Ok(());
        }
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let already_finished = self.status.is(Status::Finish);
        self.status.set(Status::Finish);
        self.step_filter.reset();
        if !already_finished {
            let _ = self.mi2.interrupt();
        }
        log_errors!(self.mi2.exit().await);
        for task in self.io_tasks.drain(..) {
            task.abort();
        }
        self.var_refs.reset();
    }

    /// Debuggee I/O: its output stream becomes DAP `output` events, and the
    /// adapter's own stdin feeds its input. Started when the program starts.
    fn start_io_pumps(&mut self) {
        if !self.io_tasks.is_empty() {
            return;
        }

        let mi2 = self.mi2.clone();
        let dap_session = self.dap_session.clone();
        self.io_tasks.push(tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            loop {
                match mi2.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(count) => {
                        let output = String::from_utf8_lossy(&buffer[..count]).into_owned();
                        log_errors!(
                            dap_session
                                .send_event(EventBody::output(OutputEventBody {
                                    output,
                                    category: Some("stdout".into()),
                                    ..Default::default()
                                }))
                                .await
                        );
                    }
                    Err(err) => {
                        debug!("End of debuggee output: {}", err);
                        break;
                    }
                }
            }
        }));

        let mi2 = self.mi2.clone();
        self.io_tasks.push(tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(count) => {
                        if mi2.write(&buffer[..count]).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }));
    }

    async fn handle_notification(&mut self, record: Record) {
        match record.kind {
            RecordKind::Exec => match record.class.as_str() {
                "stopped" => self.process_stopped(&record).await,
                "running" => self.process_running(),
                _ => {}
            },
            _ => {}
        }
    }

    async fn process_stopped(&mut self, record: &Record) {
        let stop = mi2_output::parse_stopped_event(&record.payload);
        match stop.reason {
            StopReason::Breakpoint => {
                self.status.set(Status::Stopped);
                self.send_stopped_event("breakpoint");
            }
            StopReason::Step => {
                match self.step_filter.verdict(&stop.full_path, &self.pre_action) {
                    StepVerdict::Surface => {
                        self.status.set(Status::Stopped);
                        self.send_stopped_event("step");
                    }
                    StepVerdict::StepOut => {
                        // A step-in walked into library code; step back out.
                        // The program is not really stopping, so the paired
                        // running notification is swallowed.
                        self.pre_action = "exec-finish".to_string();
                        match self.mi2.send_async(|_| {}, "exec-finish", &[]).await {
                            Ok(()) => self.step_filter.expect_skipped_continued(),
                            Err(err) => {
                                error!("step-out of library code failed: {}", err);
                                self.status.set(Status::Stopped);
                                self.send_stopped_event("step");
                            }
                        }
                    }
                    StepVerdict::Continue => {
                        self.pre_action = "exec-continue".to_string();
                        match self.mi2.send_async(|_| {}, "exec-continue", &[]).await {
                            Ok(()) => self.step_filter.expect_skipped_continued(),
                            Err(err) => {
                                error!("continue out of library code failed: {}", err);
                                self.status.set(Status::Stopped);
                                self.send_stopped_event("step");
                            }
                        }
                    }
                }
            }
            StopReason::ExitedNormally => {
                self.status.set(Status::Finish);
                self.step_filter.reset();
                self.send_event(EventBody::terminated(Default::default()));
            }
            StopReason::Unknown => {
                debug!("Unhandled stop: {:?}", record.payload);
            }
        }
    }

    fn process_running(&mut self) {
        // A running notification caused by a filter re-issue never reaches
        // the client.
        if self.step_filter.consume_skipped_continued() {
            return;
        }
        self.status.set(Status::Running);
        self.send_event(EventBody::continued(ContinuedEventBody {
            thread_id: Some(SINGLE_THREAD_ID),
            all_threads_continued: Some(true),
        }));
    }

    fn send_stopped_event(&self, reason: &str) {
        self.send_event(EventBody::stopped(StoppedEventBody {
            reason: reason.to_string(),
            thread_id: Some(SINGLE_THREAD_ID),
            all_threads_stopped: Some(true),
            ..Default::default()
        }));
    }

    fn send_response(&self, request_seq: u32, result: Result<ResponseBody, Error>) {
        let response = match result {
            Ok(body) => Response {
                request_seq,
                success: true,
                result: ResponseResult::Success { body },
            },
            Err(err) => {
                let blamed = BlamedError::from(err);
                let (message, show) = match blamed.blame {
                    Blame::Internal => (format!("Internal debugger error: {}", blamed.inner), true),
                    Blame::User => (format!("{}", blamed.inner), true),
                    Blame::Nobody => (format!("{}", blamed.inner), false),
                };
                if show {
                    error!("{}", message);
                } else {
                    debug!("{}", message);
                }
                Response {
                    request_seq,
                    success: false,
                    result: ResponseResult::Error {
                        command: String::new(),
                        message,
                        show_user: Some(show),
                    },
                }
            }
        };
        log_errors!(self.dap_session.try_send_response(response));
    }

    fn send_event(&self, event_body: EventBody) {
        log_errors!(self.dap_session.try_send_event(event_body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap_codec::DAPCodec;
    use crate::mi2_codec::parse_record;
    use futures::StreamExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio_util::codec::{Decoder as _, Framed};

    // Answers every command with ^done; break-insert gets a numbered bkpt
    // payload, stack-list-frames a one-frame stack.
    const GDB_STUB: &str = r#"count=0
while read line; do
  tok="${line%%-*}"; cmd="${line#*-}"
  case "$cmd" in
    break-insert*) count=$((count+1)); echo "${tok}^done,bkpt={number=\"${count}\",line=\"3\"}" ;;
    stack-list-frames*) echo "${tok}^done,stack=[frame={level=\"0\",func=\"main\",fullname=\"/tmp/work/main.c\",line=\"3\"}]" ;;
    gdb-exit*) echo "${tok}^exit"; exit 0 ;;
    *) echo "${tok}^done" ;;
  esac
done"#;

    type Client = Framed<tokio::io::DuplexStream, DAPCodec>;

    async fn make_session() -> (DebugSession, Client) {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let framed = DAPCodec::new().framed(server_end);
        let (dap_session, dap_fut) = DAPSession::new(Box::new(framed));
        tokio::spawn(dap_fut);

        let (mi2, _notifications) = Mi2Session::start_custom(
            vec!["sh".to_string(), "-c".to_string(), GDB_STUB.to_string()],
            None,
        )
        .await
        .unwrap();

        let var_refs = Arc::new(HandleMap::new());
        let expander =
            VariableExpander::new(mi2.clone(), var_refs.clone(), Expansion::C, None);
        let session = DebugSession {
            dap_session,
            options: SessionOptions {
                exec_file: PathBuf::from("/tmp/work/main"),
                language: Language::C,
                code_file: None,
            },
            mi2,
            var_refs,
            expander,
            status: Arc::new(StatusMachine::new()),
            step_filter: StepFilter::new("/tmp/work"),
            breakpoint_numbers: tokio::sync::Mutex::new(Vec::new()),
            pre_action: String::new(),
            io_tasks: Vec::new(),
        };
        (session, DAPCodec::new().framed(client_end))
    }

    async fn next_message(client: &mut Client) -> ProtocolMessage {
        tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message within 5s")
            .expect("channel closed")
            .expect("io error")
            .expect("malformed frame")
    }

    async fn expect_silence(client: &mut Client) {
        let result = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
        assert!(result.is_err(), "expected no message, got one");
    }

    fn known(arguments: RequestArguments) -> Request {
        Request::Known(arguments)
    }

    fn exec_record(line: &str) -> Record {
        parse_record(line).unwrap()
    }

    fn stopped_record(line: &str) -> Record {
        parse_record(line).unwrap()
    }

    #[tokio::test]
    async fn initialize_replies_with_capabilities_and_initialized_event() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_request(
                1,
                known(RequestArguments::initialize(
                    serde_json::from_str("{}").unwrap(),
                )),
            )
            .await;

        // The initialized event goes out before the response.
        let event = next_message(&mut client).await;
        assert!(matches!(
            event.type_,
            ProtocolMessageType::Event(EventBody::initialized)
        ));
        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                request_seq,
                success: true,
                result: ResponseResult::Success { body: ResponseBody::initialize(caps) },
            }) => {
                assert_eq!(request_seq, 1);
                assert_eq!(caps.supports_configuration_done_request, Some(true));
                assert_eq!(caps.supports_function_breakpoints, Some(false));
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_commands_report_unsupported() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_request(
                7,
                Request::Unknown(UnknownRequest {
                    command: "readMemory".into(),
                    arguments: None,
                }),
            )
            .await;

        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                success: false,
                result: ResponseResult::Error { message, command, .. },
                ..
            }) => {
                assert_eq!(message, "readMemory is not yet supported");
                assert_eq!(command, "readMemory");
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn stepping_requires_a_stopped_debuggee() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_request(
                2,
                known(RequestArguments::next(NextArguments { thread_id: 1 })),
            )
            .await;

        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                success: false,
                result: ResponseResult::Error { message, .. },
                ..
            }) => assert_eq!(message, "程序运行中，无法执行单步调试"),
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn stack_trace_requires_a_stopped_debuggee() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_request(
                3,
                known(RequestArguments::stackTrace(StackTraceArguments {
                    thread_id: 1,
                    start_frame: None,
                    levels: None,
                })),
            )
            .await;

        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response { success, result, .. }) => {
                assert!(!success);
                assert!(matches!(result, ResponseResult::Error { .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn stack_trace_lists_frames_when_stopped() {
        let (mut session, mut client) = make_session().await;
        session.status.set(Status::Stopped);
        session
            .handle_request(
                4,
                known(RequestArguments::stackTrace(StackTraceArguments {
                    thread_id: 1,
                    start_frame: None,
                    levels: None,
                })),
            )
            .await;

        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                success: true,
                result: ResponseResult::Success { body: ResponseBody::stackTrace(body) },
                ..
            }) => {
                assert_eq!(body.total_frames, Some(1));
                assert_eq!(body.stack_frames[0].name, "main");
                assert_eq!(body.stack_frames[0].line, 3);
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn set_breakpoints_replaces_the_tracked_set() {
        let (mut session, mut client) = make_session().await;
        let source = Source {
            path: Some("/tmp/work/main.c".into()),
            ..Default::default()
        };

        session
            .handle_request(
                5,
                known(RequestArguments::setBreakpoints(SetBreakpointsArguments {
                    source: source.clone(),
                    breakpoints: Some(vec![
                        SourceBreakpoint { line: 3, column: None },
                        SourceBreakpoint { line: 7, column: None },
                    ]),
                    source_modified: None,
                })),
            )
            .await;

        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                success: true,
                result: ResponseResult::Success { body: ResponseBody::setBreakpoints(body) },
                ..
            }) => {
                assert_eq!(body.breakpoints.len(), 2);
                assert!(body.breakpoints.iter().all(|bp| bp.verified));
                assert_eq!(body.breakpoints[0].id, Some(1));
                assert_eq!(body.breakpoints[1].id, Some(2));
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(session.breakpoint_numbers.lock().await.len(), 2);

        // An empty request for the same source deletes everything.
        session
            .handle_request(
                6,
                known(RequestArguments::setBreakpoints(SetBreakpointsArguments {
                    source,
                    breakpoints: Some(vec![]),
                    source_modified: None,
                })),
            )
            .await;
        let response = next_message(&mut client).await;
        match response.type_ {
            ProtocolMessageType::Response(Response {
                result: ResponseResult::Success { body: ResponseBody::setBreakpoints(body) },
                ..
            }) => assert!(body.breakpoints.is_empty()),
            other => panic!("{:?}", other),
        }
        assert!(session.breakpoint_numbers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn breakpoint_stops_surface_and_mark_stopped() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_notification(stopped_record(
                r#"*stopped,reason="breakpoint-hit",frame={func="main",fullname="/tmp/work/main.c",line="3"}"#,
            ))
            .await;

        assert!(session.status.is(Status::Stopped));
        let event = next_message(&mut client).await;
        match event.type_ {
            ProtocolMessageType::Event(EventBody::stopped(body)) => {
                assert_eq!(body.reason, "breakpoint");
                assert_eq!(body.thread_id, Some(SINGLE_THREAD_ID));
            }
            other => panic!("{:?}", other),
        }
    }

    #[tokio::test]
    async fn running_notifications_become_continued_events() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_notification(exec_record(r#"*running,thread-id="all""#))
            .await;

        assert!(session.status.is(Status::Running));
        let event = next_message(&mut client).await;
        assert!(matches!(
            event.type_,
            ProtocolMessageType::Event(EventBody::continued(_))
        ));
    }

    #[tokio::test]
    async fn step_stops_outside_the_workspace_are_not_delivered() {
        let (mut session, mut client) = make_session().await;
        session.pre_action = "exec-step".to_string();

        // A stepIn landed in libc: no stopped event may reach the client.
        session
            .handle_notification(stopped_record(
                r#"*stopped,reason="end-stepping-range",frame={func="_IO_printf",fullname="/usr/src/glibc/stdio-common/printf.c",line="28"}"#,
            ))
            .await;
        expect_silence(&mut client).await;

        // The corrective command's running notification is swallowed too.
        session
            .handle_notification(exec_record(r#"*running,thread-id="all""#))
            .await;
        expect_silence(&mut client).await;

        // Back in the workspace, the stop surfaces normally.
        session
            .handle_notification(stopped_record(
                r#"*stopped,reason="end-stepping-range",frame={func="main",fullname="/tmp/work/main.c",line="5"}"#,
            ))
            .await;
        let event = next_message(&mut client).await;
        match event.type_ {
            ProtocolMessageType::Event(EventBody::stopped(body)) => {
                assert_eq!(body.reason, "step")
            }
            other => panic!("{:?}", other),
        }
        assert!(session.status.is(Status::Stopped));
    }

    #[tokio::test]
    async fn normal_exit_terminates_the_session() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_notification(exec_record(r#"*stopped,reason="exited-normally""#))
            .await;

        assert!(session.status.is(Status::Finish));
        let event = next_message(&mut client).await;
        assert!(matches!(
            event.type_,
            ProtocolMessageType::Event(EventBody::terminated(_))
        ));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let (mut session, mut client) = make_session().await;
        session
            .handle_request(8, known(RequestArguments::terminate(None)))
            .await;
        let response = next_message(&mut client).await;
        assert!(matches!(
            response.type_,
            ProtocolMessageType::Response(Response { success: true, .. })
        ));
        assert!(session.status.is(Status::Finish));

        session
            .handle_request(9, known(RequestArguments::terminate(None)))
            .await;
        let response = next_message(&mut client).await;
        assert!(matches!(
            response.type_,
            ProtocolMessageType::Response(Response { success: true, .. })
        ));
    }
}
