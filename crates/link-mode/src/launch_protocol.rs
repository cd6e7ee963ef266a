//! Launch requests sent to a terminal server over a Unix socket
//!
//! A request is `u32 total_length` followed by `total_length` bytes:
//! `u16 term_len` + TERM, `i32 argc`, then `u16 len` + bytes for each
//! argument. Strings are NUL-terminated and their lengths include the NUL.
//! Integers use the host's byte order. The server answers with one `i32`
//! exit code.

use std::io::{Read, Write};
use std::path::PathBuf;

use log::debug;

use crate::error::{LinkModeError, Result};

pub const SOCKET_NAME: &str = "link-mode.sock";
const FALLBACK_SOCKET_DIR: &str = "/tmp";

/// Requests above this size are rejected before reading the body.
pub const MAX_REQUEST_LEN: u32 = 1 << 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRequest {
    pub term: String,
    pub argv: Vec<String>,
}

impl LaunchRequest {
    pub fn new(term: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            term: term.into(),
            argv,
        }
    }

    /// The full frame, length prefix included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let argc = i32::try_from(self.argv.len())
            .map_err(|_| protocol(format!("too many arguments: {}", self.argv.len())))?;

        let mut body = Vec::new();
        push_string(&mut body, &self.term)?;
        body.extend_from_slice(&argc.to_ne_bytes());
        for arg in &self.argv {
            push_string(&mut body, arg)?;
        }

        let total_len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_REQUEST_LEN)
            .ok_or_else(|| protocol(format!("request too large: {} bytes", body.len())))?;

        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&total_len.to_ne_bytes());
        frame.extend_from_slice(&body);
        debug!(
            "encoded launch request: term-len {}, argc {argc}, total-len {total_len}",
            self.term.len() + 1
        );
        Ok(frame)
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let total_len = u32::from_ne_bytes(len_bytes);
        if total_len > MAX_REQUEST_LEN {
            return Err(protocol(format!("request too large: {total_len} bytes")));
        }

        let mut body = vec![0u8; total_len as usize];
        reader.read_exact(&mut body)?;
        Self::decode_body(&body)
    }

    /// Parse a full frame, length prefix included.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(frame);
        let total_len = u32::from_ne_bytes(reader.take_array()?) as usize;
        let body = reader.rest();
        if body.len() != total_len {
            return Err(protocol(format!(
                "length prefix says {total_len} bytes, frame has {}",
                body.len()
            )));
        }
        Self::decode_body(body)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(body);
        let term = reader.take_string()?;

        let argc = i32::from_ne_bytes(reader.take_array()?);
        let argc = usize::try_from(argc).map_err(|_| protocol(format!("negative argc {argc}")))?;

        let mut argv = Vec::with_capacity(argc.min(body.len() / 3));
        for _ in 0..argc {
            argv.push(reader.take_string()?);
        }

        if !reader.rest().is_empty() {
            return Err(protocol(format!(
                "{} trailing bytes after arguments",
                reader.rest().len()
            )));
        }
        Ok(Self { term, argv })
    }
}

pub fn write_exit_code(writer: &mut impl Write, code: i32) -> Result<()> {
    writer.write_all(&code.to_ne_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_exit_code(reader: &mut impl Read) -> Result<i32> {
    let mut bytes = [0u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|err| protocol(format!("failed to read server response: {err}")))?;
    Ok(i32::from_ne_bytes(bytes))
}

/// Where a server is looked for when no socket is given: the user's
/// runtime directory first, then `/tmp`.
pub fn default_socket_paths() -> Vec<PathBuf> {
    dirs::runtime_dir()
        .map(|dir| dir.join(SOCKET_NAME))
        .into_iter()
        .chain(std::iter::once(
            PathBuf::from(FALLBACK_SOCKET_DIR).join(SOCKET_NAME),
        ))
        .collect()
}

fn protocol(message: impl Into<String>) -> LinkModeError {
    LinkModeError::Protocol(message.into())
}

fn push_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(protocol(format!("{s:?} contains a NUL byte")));
    }
    let len = u16::try_from(s.len() + 1)
        .map_err(|_| protocol(format!("string of {} bytes does not fit", s.len())))?;

    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn rest(&self) -> &'a [u8] {
        self.bytes
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(protocol(format!(
                "truncated request: wanted {len} bytes, {} left",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn take_string(&mut self) -> Result<String> {
        let len = u16::from_ne_bytes(self.take_array()?) as usize;
        let bytes = self.take(len)?;
        let Some((&0, text)) = bytes.split_last() else {
            return Err(protocol("string is not NUL-terminated"));
        };
        if text.contains(&0) {
            return Err(protocol("string contains an embedded NUL"));
        }
        String::from_utf8(text.to_vec()).map_err(|err| protocol(format!("invalid UTF-8: {err}")))
    }
}

#[cfg(unix)]
mod unix {
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::Path;

    use log::{debug, warn};

    use super::{default_socket_paths, read_exit_code, write_exit_code, LaunchRequest};
    use crate::error::{LinkModeError, Result};

    /// Connect to `socket`, or to the first default location that accepts.
    pub fn connect(socket: Option<&Path>) -> Result<UnixStream> {
        if let Some(path) = socket {
            return UnixStream::connect(path).map_err(|err| {
                warn!("{}: failed to connect: {err}", path.display());
                LinkModeError::Io(err)
            });
        }

        let mut last_err = None;
        for path in default_socket_paths() {
            match UnixStream::connect(&path) {
                Ok(stream) => {
                    debug!("connected to {}", path.display());
                    return Ok(stream);
                }
                Err(err) => {
                    warn!("{}: failed to connect: {err}", path.display());
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .map(LinkModeError::Io)
            .unwrap_or_else(|| LinkModeError::Protocol("no server socket to try".to_string())))
    }

    /// Send one request and wait for the server's exit code.
    pub fn send_request(socket: Option<&Path>, request: &LaunchRequest) -> Result<i32> {
        let mut stream = connect(socket)?;
        request.write_to(&mut stream)?;
        read_exit_code(&mut stream)
    }

    /// Accept one client, run `handler` on its request and reply with the
    /// returned exit code.
    pub fn serve_one(
        listener: &UnixListener,
        handler: impl FnOnce(&LaunchRequest) -> i32,
    ) -> Result<LaunchRequest> {
        let (mut stream, _) = listener.accept()?;
        let request = LaunchRequest::read_from(&mut stream)?;
        debug!("launch request: term {:?}, argv {:?}", request.term, request.argv);

        let code = handler(&request);
        write_exit_code(&mut stream, code)?;
        Ok(request)
    }
}

#[cfg(unix)]
pub use unix::{connect, send_request, serve_one};
