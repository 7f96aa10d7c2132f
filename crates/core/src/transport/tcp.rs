use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::MessageChannel;
use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse};
use crate::session::Event;

/// Interleaved frame marker (RFC 2326 §10.12).
const INTERLEAVED_MAGIC: u8 = b'$';

/// Largest response head (status line plus headers) accepted.
const MAX_HEAD_LEN: usize = 64 * 1024;
/// Largest `Content-Length` accepted.
const MAX_BODY_LEN: usize = 1024 * 1024;

/// RTSP control connection over TCP.
///
/// Requests are written from the caller's thread; a reader thread parses
/// everything the server sends and posts it to the engine queue:
///
/// - RTSP responses (head plus `Content-Length` body) as [`Event::Message`]
/// - `$`-framed interleaved RTP/RTCP as [`Event::Data`]
/// - end of stream or a read error as [`Event::Closed`]
///
/// [`close`](MessageChannel::close) shuts the socket down, which unblocks
/// the reader.
pub struct TcpMessageChannel {
    writer: TcpStream,
    peer_addr: SocketAddr,
    next_cseq: u32,
    user_agent: String,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl TcpMessageChannel {
    /// Connect to `host:port`, trying each resolved address in turn.
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        user_agent: &str,
        events: Sender<Event>,
    ) -> Result<Self> {
        let mut last_error = None;
        let mut stream = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        let stream = match (stream, last_error) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => return Err(RtspError::InvalidUrl(format!("{host} did not resolve"))),
        };

        Self::from_stream(stream, user_agent, events)
    }

    /// Wrap an already connected stream and start the reader thread.
    pub fn from_stream(stream: TcpStream, user_agent: &str, events: Sender<Event>) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let reader_stream = stream.try_clone()?;
        let running = Arc::new(AtomicBool::new(true));

        let r = running.clone();
        let reader = thread::spawn(move || {
            let mut reader = ResponseReader {
                reader: BufReader::new(reader_stream),
                events,
                peer_addr,
            };
            let reason = reader.run(&r);
            if r.load(Ordering::SeqCst) {
                tracing::info!(%peer_addr, reason, "RTSP connection lost");
                let _ = reader.events.send(Event::Closed(reason));
            }
        });

        tracing::info!(%peer_addr, "RTSP connection established");
        Ok(Self {
            writer: stream,
            peer_addr,
            next_cseq: 1,
            user_agent: user_agent.to_string(),
            running,
            reader: Some(reader),
        })
    }
}

impl MessageChannel for TcpMessageChannel {
    fn send(&mut self, request: RtspRequest) -> Result<u32> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RtspError::ChannelClosed);
        }

        let request = if request.get_header("User-Agent").is_none() {
            request.add_header("User-Agent", &self.user_agent)
        } else {
            request
        };

        let cseq = self.next_cseq;
        let text = request.serialize(cseq);
        self.writer.write_all(text.as_bytes())?;
        self.next_cseq += 1;

        tracing::trace!(peer = %self.peer_addr, cseq, request = %text.trim_end(), "sent");
        Ok(cseq)
    }

    fn close(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.writer.shutdown(Shutdown::Both);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        tracing::debug!(peer = %self.peer_addr, "RTSP connection closed");
    }
}

impl Drop for TcpMessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reader side of the connection.
struct ResponseReader {
    reader: BufReader<TcpStream>,
    events: Sender<Event>,
    peer_addr: SocketAddr,
}

impl ResponseReader {
    /// Read loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let first = match self.reader.fill_buf() {
                Ok([]) => return "connection closed by server",
                Ok(buf) => buf[0],
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return "read error",
            };

            let event = if first == INTERLEAVED_MAGIC {
                match self.read_interleaved() {
                    Ok(event) => event,
                    Err(_) => return "read error",
                }
            } else {
                match self.read_response() {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(RtspError::Io(_)) => return "read error",
                    Err(
                        e @ RtspError::Parse {
                            kind: ParseErrorKind::MessageTooLarge,
                        },
                    ) => {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "dropping connection");
                        return "message too large";
                    }
                    Err(e) => {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "unparseable message");
                        continue;
                    }
                }
            };

            if self.events.send(event).is_err() {
                return "session gone";
            }
        }
        "connection shutting down"
    }

    /// `$ | channel | length:16 | payload`
    fn read_interleaved(&mut self) -> std::io::Result<Event> {
        let mut header = [0u8; 4];
        self.reader.read_exact(&mut header)?;
        let channel = u16::from(header[1]);
        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        tracing::trace!(channel, len, "interleaved frame");
        Ok(Event::Data { channel, payload })
    }

    /// Response head up to the blank line, then the body. `None` for stray
    /// blank lines between messages.
    fn read_response(&mut self) -> Result<Option<Event>> {
        let too_large = || RtspError::Parse {
            kind: ParseErrorKind::MessageTooLarge,
        };

        let mut head = Vec::new();
        loop {
            let remaining = (MAX_HEAD_LEN - head.len()) as u64;
            let mut line = Vec::new();
            if (&mut self.reader).take(remaining).read_until(b'\n', &mut line)? == 0 {
                if remaining == 0 {
                    return Err(too_large());
                }
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            if !line.ends_with(b"\n") && line.len() as u64 == remaining {
                return Err(too_large());
            }
            let blank = line == b"\r\n" || line == b"\n";
            if blank && head.is_empty() {
                return Ok(None);
            }
            head.extend_from_slice(&line);
            if blank {
                break;
            }
        }

        let response = RtspResponse::parse(&String::from_utf8_lossy(&head))?;
        let body_len = response.content_length()?;
        if body_len > MAX_BODY_LEN {
            return Err(too_large());
        }
        let mut body = vec![0u8; body_len];
        self.reader.read_exact(&mut body)?;

        tracing::trace!(
            peer = %self.peer_addr,
            status = response.status_code,
            body_len = body.len(),
            "received"
        );
        Ok(Some(Event::Message(response.with_body(body))))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::mpsc;

    use super::*;

    fn pair() -> (TcpMessageChannel, TcpStream, mpsc::Receiver<Event>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let channel =
            TcpMessageChannel::connect("127.0.0.1", addr.port(), Duration::from_secs(2), "test/1.0", tx)
                .unwrap();
        let (server, _) = listener.accept().unwrap();
        (channel, server, rx)
    }

    fn read_request(reader: &mut BufReader<TcpStream>) -> String {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            text.push_str(&line);
            if line == "\r\n" {
                return text;
            }
        }
    }

    #[test]
    fn assigns_cseq_and_user_agent() {
        let (mut channel, server, _rx) = pair();
        assert_eq!(channel.send(RtspRequest::options("rtsp://h/s")).unwrap(), 1);
        assert_eq!(channel.send(RtspRequest::describe("rtsp://h/s")).unwrap(), 2);

        let mut server = BufReader::new(server);
        let first = read_request(&mut server);
        assert!(first.starts_with("OPTIONS rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\n"));
        assert!(first.contains("User-Agent: test/1.0\r\n"));
        let second = read_request(&mut server);
        assert!(second.starts_with("DESCRIBE rtsp://h/s RTSP/1.0\r\nCSeq: 2\r\n"));
    }

    #[test]
    fn demultiplexes_responses_and_frames() {
        let (_channel, mut server, rx) = pair();
        let mut wire = Vec::new();
        wire.extend_from_slice(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\n");
        wire.extend_from_slice(&[b'$', 0, 0, 3, 0x80, 0x60, 0x01]);
        wire.extend_from_slice(b"\r\nRTSP/1.0 200 OK\r\nCSeq: 3\r\n\r\n");
        server.write_all(&wire).unwrap();

        let timeout = Duration::from_secs(2);
        match rx.recv_timeout(timeout).unwrap() {
            Event::Message(response) => {
                assert_eq!(response.cseq(), Some(2));
                assert_eq!(response.body, b"v=0\r\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv_timeout(timeout).unwrap() {
            Event::Data { channel, payload } => {
                assert_eq!(channel, 0);
                assert_eq!(payload, vec![0x80, 0x60, 0x01]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv_timeout(timeout).unwrap() {
            Event::Message(response) => assert_eq!(response.cseq(), Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_content_length_closes_connection() {
        let (_channel, mut server, rx) = pair();
        server
            .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 4294967295\r\n\r\n")
            .unwrap();
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Event::Closed(reason) => assert_eq!(reason, "message too large"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unterminated_header_closes_connection() {
        let (_channel, mut server, rx) = pair();
        let mut wire = b"RTSP/1.0 200 OK\r\nX-Filler: ".to_vec();
        wire.resize(MAX_HEAD_LEN + 16, b'a');
        server.write_all(&wire).unwrap();
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Event::Closed(reason) => assert_eq!(reason, "message too large"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_close_reported() {
        let (_channel, server, rx) = pair();
        drop(server);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Event::Closed(_)
        ));
    }

    #[test]
    fn close_is_quiet_and_idempotent() {
        let (mut channel, _server, rx) = pair();
        channel.close();
        channel.close();
        assert!(matches!(
            channel.send(RtspRequest::options("rtsp://h/s")),
            Err(RtspError::ChannelClosed)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, _rx) = mpsc::channel();
        assert!(
            TcpMessageChannel::connect("127.0.0.1", port, Duration::from_millis(500), "t", tx).is_err()
        );
    }
}
