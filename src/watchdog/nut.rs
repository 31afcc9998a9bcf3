//! Minimal NUT (Network UPS Tools) client
//!
//! Speaks just enough of the upsd line protocol to tell whether the driver
//! behind a NUT server is still serving devices: login and `LIST UPS`.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// Port upsd listens on unless told otherwise
pub const DEFAULT_NUT_PORT: u16 = 3493;

/// Longest response line accepted, newline excluded
pub const MAX_LINE_LEN: usize = 4096;

/// NUT protocol errors
#[derive(Error, Debug)]
pub enum NutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("server returned ERR {0}")]
    Server(String),

    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(String),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("response line longer than {limit} bytes")]
    LineTooLong { limit: usize },
}

/// A device advertised by the NUT server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ups {
    pub name: String,
    pub description: String,
}

/// Connected NUT client
pub struct NutClient {
    stream: BufStream<TcpStream>,
}

impl NutClient {
    /// Connect to `host` or `host:port`; the port defaults to 3493
    pub async fn connect(addr: &str) -> Result<Self, NutError> {
        let (host, port) = split_host_port(addr)?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;

        Ok(Self {
            stream: BufStream::new(stream),
        })
    }

    /// Log in with `USERNAME` / `PASSWORD`
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), NutError> {
        self.send(&format!("USERNAME {}", quote(username))).await?;
        self.expect_ok().await?;

        self.send(&format!("PASSWORD {}", quote(password))).await?;
        self.expect_ok().await
    }

    /// List the devices the server knows about
    pub async fn list_ups(&mut self) -> Result<Vec<Ups>, NutError> {
        self.send("LIST UPS").await?;

        let header = self.read_line().await?;
        check_err(&header)?;
        if header != "BEGIN LIST UPS" {
            return Err(NutError::UnexpectedResponse(header));
        }

        let mut devices = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "END LIST UPS" {
                break;
            }
            check_err(&line)?;

            let mut tokens = tokenize(&line)?.into_iter();
            match (tokens.next().as_deref(), tokens.next(), tokens.next()) {
                (Some("UPS"), Some(name), description) => devices.push(Ups {
                    name,
                    description: description.unwrap_or_default(),
                }),
                _ => return Err(NutError::UnexpectedResponse(line)),
            }
        }

        Ok(devices)
    }

    /// Say goodbye and wait for the reply; the server closes the connection
    /// afterwards
    pub async fn logout(&mut self) -> Result<(), NutError> {
        self.send("LOGOUT").await?;
        let reply = self.read_line().await?;
        check_err(&reply)?;
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), NutError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, NutError> {
        let mut line = String::new();
        let limit = (MAX_LINE_LEN + 2) as u64;
        let read = (&mut self.stream).take(limit).read_line(&mut line).await?;
        if read == 0 {
            return Err(NutError::ConnectionClosed);
        }

        let truncated = read as u64 == limit && !line.ends_with('\n');
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if truncated || line.len() > MAX_LINE_LEN {
            return Err(NutError::LineTooLong {
                limit: MAX_LINE_LEN,
            });
        }
        Ok(line.to_string())
    }

    async fn expect_ok(&mut self) -> Result<(), NutError> {
        let line = self.read_line().await?;
        check_err(&line)?;
        if line == "OK" || line.starts_with("OK ") {
            Ok(())
        } else {
            Err(NutError::UnexpectedResponse(line))
        }
    }
}

fn check_err(line: &str) -> Result<(), NutError> {
    match line.strip_prefix("ERR") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
            Err(NutError::Server(rest.trim().to_string()))
        }
        _ => Ok(()),
    }
}

/// Split `host[:port]`, accepting bare and bracketed IPv6 literals
pub(crate) fn split_host_port(addr: &str) -> Result<(String, u16), NutError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(NutError::InvalidAddress(addr.to_string()));
    }

    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Ok((sock.ip().to_string(), sock.port()));
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok((ip.to_string(), DEFAULT_NUT_PORT));
    }
    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        let ip: IpAddr = inner
            .parse()
            .map_err(|_| NutError::InvalidAddress(addr.to_string()))?;
        return Ok((ip.to_string(), DEFAULT_NUT_PORT));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| NutError::InvalidAddress(addr.to_string()))?;
            if host.is_empty() {
                return Err(NutError::InvalidAddress(addr.to_string()));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), DEFAULT_NUT_PORT)),
    }
}

/// Quote an argument if upsd would otherwise split or misread it
fn quote(arg: &str) -> String {
    let needs_quotes =
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Split a response line into words, honouring double quotes and escapes
fn tokenize(line: &str) -> Result<Vec<String>, NutError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => break,
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => token.push(c),
                }
            }
            if !closed {
                return Err(NutError::UnexpectedResponse(line.to_string()));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}
