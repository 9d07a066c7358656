//! Antivirus gating.
//!
//! Every byte stream that enters storage, and every stream read back out of it, is passed to
//! a [`ScanOracle`] through the [`AntivirusGate`]. The gate never retries: a transport failure
//! is surfaced to the caller as-is.
//!
//! [`ClamdScanner`] is the production oracle. It speaks clamd's `zINSTREAM` command:
//!
//! ```text
//! zINSTREAM\0
//! <u32 BE length><chunk> ...      up to CHUNK_SIZE bytes per chunk
//! <u32 BE 0>                      end of stream
//! <reply>\0                       "stream: OK" | "stream: <signature> FOUND" | "... ERROR"
//! ```

use crate::{FilesError, FilesResult};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

const INSTREAM_COMMAND: &[u8] = b"zINSTREAM\0";
const CHUNK_SIZE: usize = 2048;
const MAX_REPLY_LEN: usize = 4096;

/// Outcome of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Malware found; carries the detector's signature name.
    Infected(String),
}

/// Failure to obtain a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot reach scan oracle at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("scan oracle transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("unexpected scan oracle reply: {0}")]
    Protocol(String),

    #[error("scan oracle reported an error: {0}")]
    Oracle(String),

    #[error("scan oracle unavailable: {0}")]
    Unavailable(String),
}

/// A black-box malware scanner.
pub trait ScanOracle: Send + Sync {
    /// Scans everything readable from `source`.
    fn scan(&self, source: &mut dyn Read) -> Result<ScanVerdict, ScanError>;
}

/// Client for a clamd daemon reachable over TCP.
#[derive(Clone, Debug)]
pub struct ClamdScanner {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ClamdScanner {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&self) -> Result<TcpStream, ScanError> {
        let addr = self.address();
        let connect_err = |source| ScanError::Connect {
            addr: addr.clone(),
            source,
        };

        let candidates = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(connect_err)?;

        let mut last_error =
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_error = e,
            }
        }
        Err(connect_err(last_error))
    }
}

impl ScanOracle for ClamdScanner {
    fn scan(&self, source: &mut dyn Read) -> Result<ScanVerdict, ScanError> {
        let mut stream = self.connect()?;
        stream.write_all(INSTREAM_COMMAND)?;

        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = source.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            // n <= CHUNK_SIZE, always fits a u32
            stream.write_all(&(n as u32).to_be_bytes())?;
            stream.write_all(&chunk[..n])?;
        }
        stream.write_all(&0u32.to_be_bytes())?;
        stream.flush()?;

        let reply = read_reply(&mut stream)?;
        parse_reply(&reply)
    }
}

fn read_reply(stream: &mut impl Read) -> Result<String, ScanError> {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte)? {
            0 => break,
            _ if byte[0] == 0 => break,
            _ => {
                reply.push(byte[0]);
                if reply.len() > MAX_REPLY_LEN {
                    return Err(ScanError::Protocol("reply too long".into()));
                }
            }
        }
    }
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// Interprets one clamd reply line.
pub(crate) fn parse_reply(reply: &str) -> Result<ScanVerdict, ScanError> {
    let reply = reply.trim_end_matches(['\0', '\n', '\r', ' ']);
    let body = reply.split_once(": ").map_or(reply, |(_, rest)| rest);

    if let Some(signature) = body.strip_suffix(" FOUND") {
        return Ok(ScanVerdict::Infected(signature.trim().to_owned()));
    }
    if body == "OK" {
        return Ok(ScanVerdict::Clean);
    }
    if body.ends_with("ERROR") {
        return Err(ScanError::Oracle(reply.to_owned()));
    }
    Err(ScanError::Protocol(reply.to_owned()))
}

/// Scans byte streams before they are written or served.
#[derive(Clone)]
pub struct AntivirusGate {
    oracle: Arc<dyn ScanOracle>,
}

impl AntivirusGate {
    pub fn new(oracle: Arc<dyn ScanOracle>) -> Self {
        Self { oracle }
    }

    pub fn scan(&self, source: &mut dyn Read) -> FilesResult<ScanVerdict> {
        self.oracle.scan(source).map_err(|e| {
            tracing::error!("Antivirus scan failed: {}", e);
            FilesError::Scan(e)
        })
    }

    /// Passes clean streams, turns infections into [`FilesError::Infected`].
    pub fn ensure_clean(&self, source: &mut dyn Read) -> FilesResult<()> {
        match self.scan(source)? {
            ScanVerdict::Clean => Ok(()),
            ScanVerdict::Infected(signature) => {
                tracing::warn!("Antivirus found {}", signature);
                Err(FilesError::Infected(signature))
            }
        }
    }
}

impl std::fmt::Debug for AntivirusGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntivirusGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// A one-shot fake clamd: records the chunk sizes it received and flags any stream
    /// containing "EICAR".
    fn fake_clamd() -> (u16, thread::JoinHandle<Vec<usize>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut command = [0u8; INSTREAM_COMMAND.len()];
            conn.read_exact(&mut command).unwrap();
            assert_eq!(&command, INSTREAM_COMMAND);

            let mut sizes = Vec::new();
            let mut data = Vec::new();
            loop {
                let mut len = [0u8; 4];
                conn.read_exact(&mut len).unwrap();
                let len = u32::from_be_bytes(len) as usize;
                if len == 0 {
                    break;
                }
                let mut chunk = vec![0u8; len];
                conn.read_exact(&mut chunk).unwrap();
                sizes.push(len);
                data.extend(chunk);
            }

            let reply: &[u8] = if data.windows(5).any(|w| w == b"EICAR") {
                b"stream: Eicar-Test-Signature FOUND\0"
            } else {
                b"stream: OK\0"
            };
            conn.write_all(reply).unwrap();
            sizes
        });

        (port, handle)
    }

    fn scanner(port: u16) -> ClamdScanner {
        ClamdScanner::new("127.0.0.1", port, Duration::from_secs(5))
    }

    #[test]
    fn clean_stream_is_sent_in_chunks() {
        let (port, server) = fake_clamd();
        let content = vec![b'a'; 5000];

        let verdict = scanner(port).scan(&mut &content[..]).unwrap();
        assert_eq!(verdict, ScanVerdict::Clean);
        assert_eq!(server.join().unwrap(), vec![2048, 2048, 904]);
    }

    #[test]
    fn infected_stream_reports_signature() {
        let (port, server) = fake_clamd();

        let verdict = scanner(port).scan(&mut &b"X5O!P%@AP EICAR"[..]).unwrap();
        assert_eq!(
            verdict,
            ScanVerdict::Infected("Eicar-Test-Signature".into())
        );
        server.join().unwrap();
    }

    #[test]
    fn unreachable_oracle_is_a_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = scanner(port).scan(&mut &b"data"[..]);
        assert!(matches!(result, Err(ScanError::Connect { .. })));
    }

    #[test]
    fn reply_parsing() {
        assert_eq!(parse_reply("stream: OK").unwrap(), ScanVerdict::Clean);
        assert_eq!(
            parse_reply("stream: Win.Test.EICAR_HDB-1 FOUND\0").unwrap(),
            ScanVerdict::Infected("Win.Test.EICAR_HDB-1".into())
        );
        assert!(matches!(
            parse_reply("INSTREAM size limit exceeded. ERROR"),
            Err(ScanError::Oracle(_))
        ));
        assert!(matches!(parse_reply("PONG"), Err(ScanError::Protocol(_))));
    }

    struct Fixed(Result<ScanVerdict, String>);

    impl ScanOracle for Fixed {
        fn scan(&self, source: &mut dyn Read) -> Result<ScanVerdict, ScanError> {
            io::copy(source, &mut io::sink())?;
            self.0.clone().map_err(ScanError::Unavailable)
        }
    }

    #[test]
    fn gate_maps_verdicts_to_errors() {
        let clean = AntivirusGate::new(Arc::new(Fixed(Ok(ScanVerdict::Clean))));
        assert!(clean.ensure_clean(&mut &b"x"[..]).is_ok());

        let infected = AntivirusGate::new(Arc::new(Fixed(Ok(ScanVerdict::Infected(
            "Sig".into(),
        )))));
        assert!(matches!(
            infected.ensure_clean(&mut &b"x"[..]),
            Err(FilesError::Infected(sig)) if sig == "Sig"
        ));

        let down = AntivirusGate::new(Arc::new(Fixed(Err("offline".into()))));
        assert!(matches!(
            down.ensure_clean(&mut &b"x"[..]),
            Err(FilesError::Scan(ScanError::Unavailable(_)))
        ));
    }
}
