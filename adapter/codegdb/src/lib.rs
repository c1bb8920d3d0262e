use crate::prelude::*;
use clap::ArgMatches;
use dap_session::DAPChannel;
use std::net;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::net::TcpListener;
use tokio_util::codec::Decoder;

#[allow(unused_imports)]
mod prelude {
    pub use crate::error::{blame_nobody, blame_user, str_error, Blame, BlamedError, Error};
    pub use log::{debug, error, info, warn};
}
#[macro_use]
mod error;
mod dap_codec;
mod dap_session;
mod debug_session;
mod expander;
mod handles;
mod mi2_codec;
mod mi2_output;
mod mi2_session;
mod source_analyzer;
mod status;
mod step_filter;
mod terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(value: &str) -> Result<Language, Error> {
        match value {
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            // The managed-runtime engine is a separate project; this build
            // only drives GDB.
            "go" => Err(str_error("the go debug engine is not available in this build")),
            other => Err(str_error(format!("unsupported language: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub exec_file: PathBuf,
    pub language: Language,
    pub code_file: Option<PathBuf>,
}

pub fn debug_server(matches: &ArgMatches) -> Result<(), Error> {
    let port: u16 = matches.value_of("port").unwrap_or("8889").parse()?;
    let exec_file = PathBuf::from(
        matches
            .value_of("file")
            .ok_or_else(|| str_error("--file is required"))?,
    );
    let language = Language::from_str(matches.value_of("language").unwrap_or("c"))?;
    let code_file = matches.value_of("codeFile").map(PathBuf::from);
    let options = SessionOptions {
        exec_file,
        language,
        code_file,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    rt.block_on(async {
        let localhost = net::Ipv4Addr::new(127, 0, 0, 1);
        let addr = net::SocketAddr::new(localhost.into(), port);
        let listener = TcpListener::bind(&addr).await?;
        loop {
            info!("Listening on {}", listener.local_addr()?);
            let (tcp_stream, _) = listener.accept().await?;
            tcp_stream.set_nodelay(true)?;
            let framed_stream = dap_codec::DAPCodec::new().framed(tcp_stream);
            run_debug_session(Box::new(framed_stream), options.clone()).await;
        }
    })
}

async fn run_debug_session(framed_stream: Box<dyn DAPChannel>, options: SessionOptions) {
    debug!("New debug session");
    let (dap_session, dap_fut) = dap_session::DAPSession::new(framed_stream);
    // Subscribe before the dispatcher starts pumping, or requests sent
    // while GDB is still spawning would be dropped.
    let requests = match dap_session.subscribe_requests() {
        Ok(requests) => requests,
        Err(_) => return,
    };
    let dap_task = tokio::spawn(dap_fut);
    log_errors!(debug_session::DebugSession::run(dap_session, requests, options).await);
    dap_task.abort();
}
