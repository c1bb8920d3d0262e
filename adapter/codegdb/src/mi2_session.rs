use crate::prelude::*;

use crate::mi2_codec::{parse_record, serialize_command, Record, RecordKind};
use crate::terminal::Terminal;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const OPTION_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_TIMEOUT: Duration = Duration::from_secs(2);

enum PendingReply {
    Rendezvous(oneshot::Sender<Record>),
    Callback(Box<dyn FnOnce(Record) + Send>),
}

/// One GDB child process, spoken to over MI2.
///
/// Every command gets a monotonic token; the reader task routes each reply
/// record back to its sender through the shared pending map, and hands
/// records without a token (asynchronous notifications) to the channel
/// returned from `start`. The debuggee's standard streams run through a
/// PTY whose master stays here.
pub struct Mi2Session {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Child>,
    pid: i32,
    sequence: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingReply>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    terminal: Option<Terminal>,
}

impl Mi2Session {
    /// Spawn GDB with the debuggee's terminal attached and load the target
    /// executable.
    pub async fn start(exec_file: &Path) -> Result<(Arc<Mi2Session>, mpsc::Receiver<Record>), Error> {
        let terminal = Terminal::open()?;
        let argv = vec![
            "gdb".to_string(),
            "--nx".to_string(),
            "--quiet".to_string(),
            "--interpreter=mi2".to_string(),
            "--tty".to_string(),
            terminal.slave_name().to_string_lossy().into_owned(),
        ];
        let (session, notifications) = Mi2Session::start_custom(argv, Some(terminal)).await?;

        let reply = session
            .send_with_timeout(
                OPTION_TIMEOUT,
                "file-exec-and-symbols",
                &[exec_file.to_string_lossy().into_owned()],
            )
            .await;
        match reply {
            Ok(reply) if reply.is_done() => Ok((session, notifications)),
            Ok(_) => {
                let _ = session.exit().await;
                Err(blame_user(str_error("目标代码加载失败")).into())
            }
            Err(err) => {
                let _ = session.exit().await;
                Err(err)
            }
        }
    }

    /// Spawn an arbitrary MI2-speaking command. Used directly by tests.
    pub(crate) async fn start_custom(
        argv: Vec<String>,
        terminal: Option<Terminal>,
    ) -> Result<(Arc<Mi2Session>, mpsc::Receiver<Record>), Error> {
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| str_error(format!("cannot spawn {}: {}", argv[0], err)))?;

        let stdin = child.stdin.take().ok_or_else(|| str_error("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| str_error("no stdout"))?;
        let pid = child.id().ok_or_else(|| str_error("no pid"))? as i32;

        let pending: Arc<Mutex<HashMap<u64, PendingReply>>> = Arc::new(Mutex::new(HashMap::new()));
        let (notify_sender, notify_receiver) = mpsc::channel(100);
        let reader = tokio::spawn(record_reader(stdout, pending.clone(), notify_sender));

        let session = Arc::new(Mi2Session {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            child: tokio::sync::Mutex::new(child),
            pid,
            sequence: AtomicU64::new(1),
            pending,
            reader: Mutex::new(Some(reader)),
            terminal,
        });
        Ok((session, notify_receiver))
    }

    /// Issue a command and wait for its result record.
    pub async fn send(&self, operation: &str, args: &[String]) -> Result<Record, Error> {
        let (sender, receiver) = oneshot::channel();
        let token = self.enqueue(PendingReply::Rendezvous(sender));
        self.write_command(token, operation, args).await?;
        match receiver.await {
            Ok(record) => Ok(record),
            Err(_) => Err(str_error("gdb session closed")),
        }
    }

    /// Like `send`, but gives up after `timeout`. The pending slot is
    /// reclaimed on expiry; a late reply is discarded by the reader.
    pub async fn send_with_timeout(
        &self,
        timeout: Duration,
        operation: &str,
        args: &[String],
    ) -> Result<Record, Error> {
        let (sender, receiver) = oneshot::channel();
        let token = self.enqueue(PendingReply::Rendezvous(sender));
        self.write_command(token, operation, args).await?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(_)) => Err(str_error("gdb session closed")),
            Err(_) => {
                self.pending.lock().unwrap().remove(&token);
                Err(str_error(format!("timeout: {} after {:?}", operation, timeout)))
            }
        }
    }

    /// Issue a command whose result is handled by `callback` on the reader
    /// task; returns as soon as the command is written.
    pub async fn send_async(
        &self,
        callback: impl FnOnce(Record) + Send + 'static,
        operation: &str,
        args: &[String],
    ) -> Result<(), Error> {
        let token = self.enqueue(PendingReply::Callback(Box::new(callback)));
        self.write_command(token, operation, args).await
    }

    fn enqueue(&self, reply: PendingReply) -> u64 {
        let token = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(token, reply);
        token
    }

    async fn write_command(&self, token: u64, operation: &str, args: &[String]) -> Result<(), Error> {
        let line = serialize_command(token, operation, args);
        debug!("--> {}", line.trim_end());
        let mut stdin = self.stdin.lock().await;
        match stdin.as_mut() {
            Some(stdin) => {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await?;
                Ok(())
            }
            None => {
                self.pending.lock().unwrap().remove(&token);
                Err(str_error("gdb session closed"))
            }
        }
    }

    /// Read from the debuggee's output stream.
    pub async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &self.terminal {
            Some(terminal) => terminal.read(buf).await,
            None => Ok(0),
        }
    }

    /// Write to the debuggee's input stream.
    pub async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.terminal {
            Some(terminal) => terminal.write(buf).await,
            None => Ok(0),
        }
    }

    /// SIGINT the GDB process so it can stop the debuggee and get back to
    /// reading commands.
    pub fn interrupt(&self) -> Result<(), Error> {
        kill(Pid::from_raw(self.pid), Signal::SIGINT).map_err(str_error)?;
        Ok(())
    }

    /// Orderly shutdown: ask GDB to exit, close its stdin, drain the reader,
    /// reap the child, and only then tear down the PTY.
    pub async fn exit(&self) -> Result<(), Error> {
        let _ = self.send_with_timeout(EXIT_TIMEOUT, "gdb-exit", &[]).await;
        self.stdin.lock().await.take();

        let reader = self.reader.lock().unwrap().take();
        if let Some(reader) = reader {
            log_errors!(reader.await);
        }

        log_errors!(self.child.lock().await.wait().await);

        if let Some(terminal) = &self.terminal {
            terminal.close_slave();
        }
        Ok(())
    }
}

async fn record_reader(
    stdout: ChildStdout,
    pending: Arc<Mutex<HashMap<u64, PendingReply>>>,
    notifications: mpsc::Sender<Record>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("gdb stdout: {}", err);
                break;
            }
        };
        debug!("<-- {}", line);
        let record = match parse_record(&line) {
            Some(record) => record,
            None => continue,
        };
        // Stream records were already traced above; only command replies
        // and true asynchronous notifications go further.
        if matches!(
            record.kind,
            RecordKind::Console | RecordKind::Target | RecordKind::Log
        ) {
            continue;
        }
        match record.sequence {
            Some(token) => {
                let entry = pending.lock().unwrap().remove(&token);
                match entry {
                    Some(PendingReply::Rendezvous(sender)) => {
                        let _ = sender.send(record);
                    }
                    Some(PendingReply::Callback(callback)) => callback(record),
                    // A reply that timed out and was reclaimed.
                    None => debug!("discarding reply for token {}", token),
                }
            }
            None => {
                if notifications.send(record).await.is_err() {
                    break;
                }
            }
        }
    }
    // Unblock anyone still waiting: dropping the senders fails their
    // rendezvous with "gdb session closed".
    pending.lock().unwrap().clear();
    debug!("record reader done");
}
