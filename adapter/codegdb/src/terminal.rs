use crate::prelude::*;

use nix::pty::openpty;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};
use nix::unistd::ttyname;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::unix::AsyncFd;

/// The debuggee's pseudo-terminal. The slave end becomes the debuggee's
/// controlling terminal (GDB opens it by name via `--tty`); the master end
/// stays here for I/O proxying. The master is raw so no line discipline
/// alters the debuggee's output, and non-blocking so it can be driven from
/// the async runtime.
pub struct Terminal {
    master: AsyncFd<OwnedFd>,
    slave: Mutex<Option<OwnedFd>>,
    slave_name: PathBuf,
}

impl Terminal {
    pub fn open() -> Result<Terminal, Error> {
        let pty = openpty(None, None).map_err(str_error)?;

        let mut termios = tcgetattr(&pty.master).map_err(str_error)?;
        cfmakeraw(&mut termios);
        tcsetattr(&pty.master, SetArg::TCSANOW, &termios).map_err(str_error)?;

        let fd = pty.master.as_raw_fd();
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                bail!(str_error(io::Error::last_os_error()));
            }
        }

        let slave_name = ttyname(&pty.slave).map_err(str_error)?;

        Ok(Terminal {
            master: AsyncFd::new(pty.master)?,
            slave: Mutex::new(Some(pty.slave)),
            slave_name,
        })
    }

    pub fn slave_name(&self) -> &Path {
        &self.slave_name
    }

    /// Read from the debuggee's output. Returns Ok(0) once the terminal is
    /// gone (the kernel reports EIO on a master whose slave side closed).
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::read(
                        fd.get_ref().as_raw_fd(),
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(err)) if err.raw_os_error() == Some(libc::EIO) => return Ok(0),
                Ok(Err(err)) => return Err(err),
                Err(_would_block) => continue,
            }
        }
    }

    /// Write to the debuggee's input.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.writable().await?;
            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::write(
                        fd.get_ref().as_raw_fd(),
                        buf.as_ptr() as *const libc::c_void,
                        buf.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Release the slave end. After the debuggee is gone this is what makes
    /// master reads start failing, unblocking the output pump.
    pub fn close_slave(&self) {
        self.slave.lock().unwrap().take();
    }
}
