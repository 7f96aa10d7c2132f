//! Client-side RTSP session (RFC 2326 §A.1).
//!
//! A [`Session`] drives the request sequence against one server and owns
//! everything negotiated along the way: the session id, the video payload
//! type and codec, the transport channels and the cached auth challenge.
//!
//! ## Request sequence
//!
//! ```text
//! OPTIONS (CSeq 1)  -> start keepalive, DESCRIBE
//! DESCRIBE 401      -> cache challenge, DESCRIBE + Authorization
//! DESCRIBE 200      -> parse SDP, SETUP <control uri>
//! SETUP 200         -> store Session id, PLAY
//! PLAY 200          -> Playing
//! ```
//!
//! Any other non-2xx reply (and a second 401) aborts the session silently:
//! nothing further is sent and the state becomes
//! [`SessionState::Aborted`].
//!
//! ## Threading
//!
//! The session lives on a single engine thread and is fed [`Event`]s from
//! one queue ([`Session::run`]). Other threads observe it through the
//! shared [`SessionMonitor`].

pub mod event;
pub mod keepalive;
pub mod status;
pub mod transport;

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use crate::client::ClientConfig;
use crate::error::Result;
use crate::media::MediaSink;
use crate::media::demux::RtpDemuxer;
use crate::media::h264::H264Parameters;
use crate::protocol::{AuthChallenge, Credentials, Method, RtspRequest, RtspResponse, SessionDescription};
use crate::transport::{MediaPaths, MessageChannel};

pub use event::{Command, Event};
pub use keepalive::Keepalive;
pub use status::{ConnectionStatus, SessionMonitor, SessionState};
pub use transport::{TransportDescriptor, TransportHeader, TransportMode};

/// What an outstanding `CSeq` was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest {
    Options,
    Describe { authorized: bool },
    Setup,
    Play,
    Pause,
    Teardown,
}

/// The I/O endpoints a session talks through.
pub struct SessionLinks {
    pub channel: Box<dyn MessageChannel>,
    pub paths: Box<dyn MediaPaths>,
    pub sink: Box<dyn MediaSink>,
    /// Engine queue, handed to the keepalive timer.
    pub events: Sender<Event>,
    pub monitor: SessionMonitor,
}

/// RTSP session state machine.
pub struct Session {
    url: String,
    credentials: Option<Credentials>,
    mode: TransportMode,
    keepalive_interval: Duration,

    /// Empty until SETUP succeeds; set once.
    session_id: Option<String>,
    /// Unknown until the first video block is seen; set once.
    video_payload_type: Option<u8>,
    video_codec: String,
    transport: Option<TransportDescriptor>,
    auth: Option<AuthChallenge>,
    pending: HashMap<u32, PendingRequest>,

    channel: Box<dyn MessageChannel>,
    paths: Box<dyn MediaPaths>,
    demux: RtpDemuxer,
    events: Sender<Event>,
    keepalive: Option<Keepalive>,
    monitor: SessionMonitor,
    released: bool,
}

impl Session {
    /// `url` must already be stripped of user-info; `credentials` are used
    /// only after the server challenges.
    pub fn new(
        url: &str,
        credentials: Option<Credentials>,
        config: &ClientConfig,
        links: SessionLinks,
    ) -> Self {
        Session {
            url: url.to_string(),
            credentials,
            mode: config.transport,
            keepalive_interval: config.keepalive_interval,
            session_id: None,
            video_payload_type: None,
            video_codec: String::new(),
            transport: None,
            auth: None,
            pending: HashMap::new(),
            channel: links.channel,
            paths: links.paths,
            demux: RtpDemuxer::new(links.sink),
            events: links.events,
            keepalive: None,
            monitor: links.monitor,
            released: false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn video_payload_type(&self) -> Option<u8> {
        self.video_payload_type
    }

    pub fn video_codec(&self) -> &str {
        &self.video_codec
    }

    pub fn state(&self) -> SessionState {
        self.monitor.state()
    }

    /// Begin the handshake by sending OPTIONS.
    pub fn start(&mut self) {
        self.monitor.set_state(SessionState::Connected);
        let request = RtspRequest::options(&self.url);
        if let Err(e) = self.send(request, PendingRequest::Options) {
            self.abort(&format!("OPTIONS failed: {e}"));
        }
    }

    /// Consume events until the session is stopped or the connection closes.
    pub fn run(mut self, events: Receiver<Event>) {
        self.start();
        while let Ok(event) = events.recv() {
            if !self.handle_event(event) {
                break;
            }
        }
        self.release();
        tracing::debug!(url = %self.url, "session engine finished");
    }

    /// Process one event. Returns `false` once the session is finished.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Message(response) => self.handle_response(response),
            Event::Data { channel, payload } => self.demux.handle(channel, &payload),
            Event::Command(Command::Play) => self.play(),
            Event::Command(Command::Pause) => self.pause(),
            Event::Command(Command::Stop) => {
                self.stop();
                return false;
            }
            Event::KeepaliveTick => self.send_keepalive(),
            Event::Closed(reason) => {
                tracing::info!(reason, url = %self.url, "RTSP connection closed");
                self.monitor.set_status(ConnectionStatus::Disconnected);
                self.release();
                return false;
            }
        }
        true
    }

    pub fn handle_response(&mut self, response: RtspResponse) {
        if self.monitor.stop_requested() || self.released {
            tracing::trace!(status = response.status_code, "response after stop ignored");
            return;
        }

        if let Some(header) = response.get_header("WWW-Authenticate") {
            if let Some(challenge) = AuthChallenge::parse(header) {
                tracing::debug!(realm = challenge.realm(), "auth challenge cached");
                self.auth = Some(challenge);
            }
        }

        let Some(cseq) = response.cseq() else {
            tracing::warn!(status = response.status_code, "response without CSeq ignored");
            return;
        };
        let Some(pending) = self.pending.remove(&cseq) else {
            tracing::warn!(cseq, "response to unknown CSeq ignored");
            return;
        };

        tracing::debug!(
            cseq,
            status = response.status_code,
            reason = %response.reason,
            request = ?pending,
            "RTSP response"
        );

        if self.monitor.state() == SessionState::Aborted {
            return;
        }

        let result = match pending {
            PendingRequest::Options => self.on_options(cseq),
            PendingRequest::Describe { authorized } => self.on_describe(&response, authorized),
            PendingRequest::Setup => self.on_setup(&response),
            PendingRequest::Play => self.on_play(&response),
            PendingRequest::Pause => {
                if response.is_success() {
                    self.monitor.set_state(SessionState::Paused);
                } else {
                    tracing::warn!(status = response.status_code, "PAUSE rejected");
                }
                Ok(())
            }
            PendingRequest::Teardown => Ok(()),
        };

        if let Err(e) = result {
            self.abort(&e.to_string());
        }
    }

    fn on_options(&mut self, cseq: u32) -> Result<()> {
        // Only the handshake OPTIONS moves the session on; keepalive replies
        // are ignored.
        if cseq != 1 {
            return Ok(());
        }
        if self.keepalive.is_none() {
            self.keepalive = Some(Keepalive::start(self.keepalive_interval, self.events.clone()));
        }
        self.monitor.set_state(SessionState::Describing);
        self.send(RtspRequest::describe(&self.url), PendingRequest::Describe { authorized: false })?;
        Ok(())
    }

    fn on_describe(&mut self, response: &RtspResponse, authorized: bool) -> Result<()> {
        if response.is_unauthorized() {
            if authorized {
                self.abort("authentication rejected");
                return Ok(());
            }
            let Some(authorization) = self.authorization(Method::Describe, &self.url) else {
                self.abort("401 without usable credentials or challenge");
                return Ok(());
            };
            self.monitor.set_state(SessionState::Authenticating);
            let request = RtspRequest::describe(&self.url).add_header("Authorization", &authorization);
            self.send(request, PendingRequest::Describe { authorized: true })?;
            return Ok(());
        }

        if !response.is_success() {
            self.abort(&format!("DESCRIBE failed: {} {}", response.status_code, response.reason));
            return Ok(());
        }

        let sdp = SessionDescription::parse(&response.body)?;
        let Some(video) = sdp.first_video() else {
            self.abort("no video stream in session description");
            return Ok(());
        };

        let base_url = response
            .get_header("Content-Base")
            .or_else(|| response.get_header("Content-Location"))
            .unwrap_or(self.url.as_str())
            .trim_end_matches('/')
            .to_string();
        let control_url = match video.control() {
            None | Some("*") => base_url.clone(),
            Some(control) if control.to_ascii_lowercase().starts_with("rtsp://") => control.to_string(),
            Some(control) => format!("{base_url}/{control}"),
        };

        let Some(payload_type) = video.payload_type() else {
            self.abort("video media block without payload type");
            return Ok(());
        };
        if self.video_payload_type.is_none() {
            self.video_payload_type = Some(payload_type);
        }
        self.video_codec = video.encoding_name().unwrap_or_default();
        tracing::info!(
            payload_type,
            codec = %self.video_codec,
            control = %control_url,
            "video stream selected"
        );

        if self.video_codec == "H264" {
            if let Some(fmtp) = video.fmtp() {
                let params = H264Parameters::parse(fmtp);
                match params.sps_pps() {
                    Some((sps, pps)) => self.demux.emit_parameter_sets(sps, pps),
                    None => tracing::warn!(
                        count = params.sprop_parameter_sets.len(),
                        "sprop-parameter-sets without SPS and PPS"
                    ),
                }
            }
        }
        self.demux.set_stream(payload_type, &self.video_codec);

        let transport = TransportDescriptor::select(self.mode, self.paths.as_mut())?;
        self.demux.set_channels(transport.data_channel, transport.control_channel);
        let header = transport.header();
        self.transport = Some(transport);

        self.monitor.set_state(SessionState::SettingUp);
        let authorization = self.authorization(Method::Setup, &control_url);
        let request = RtspRequest::setup(&control_url, &header)
            .add_optional_header("Authorization", authorization.as_deref());
        self.send(request, PendingRequest::Setup)?;
        Ok(())
    }

    fn on_setup(&mut self, response: &RtspResponse) -> Result<()> {
        if !response.is_success() {
            self.abort(&format!("SETUP failed: {} {}", response.status_code, response.reason));
            return Ok(());
        }

        let Some(session_id) = response.session_id() else {
            self.abort("SETUP reply without Session header");
            return Ok(());
        };
        if self.session_id.is_none() {
            tracing::info!(session_id, "session established");
            self.session_id = Some(session_id.to_string());
        }

        if let Some(header) = response.get_header("Transport") {
            let reply = TransportHeader::parse(header);
            self.apply_transport_reply(&reply)?;
        }

        let authorization = self.authorization(Method::Play, &self.url);
        let request = RtspRequest::new(Method::Play, &self.url)
            .add_optional_header("Session", self.session_id.as_deref())
            .add_optional_header("Authorization", authorization.as_deref());
        self.send(request, PendingRequest::Play)?;
        Ok(())
    }

    fn apply_transport_reply(&mut self, reply: &TransportHeader) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        match transport.mode {
            TransportMode::Tcp => {
                if let Some((data, control)) = reply.interleaved {
                    transport.data_channel = data;
                    transport.control_channel = control;
                }
            }
            TransportMode::Multicast => {
                if let (Some(group), Some((data, control))) = (reply.destination, reply.port) {
                    self.paths.join_multicast(group, data, control)?;
                    transport.data_channel = data;
                    transport.control_channel = control;
                } else {
                    tracing::warn!("multicast SETUP reply without destination/port");
                }
            }
            TransportMode::Udp => {}
        }

        self.demux.set_channels(transport.data_channel, transport.control_channel);
        let (data_channel, control_channel) = self.demux.channels();
        tracing::debug!(data_channel, control_channel, "transport confirmed");
        Ok(())
    }

    fn on_play(&mut self, response: &RtspResponse) -> Result<()> {
        if !response.is_success() {
            self.abort(&format!("PLAY failed: {} {}", response.status_code, response.reason));
            return Ok(());
        }
        self.monitor.set_state(SessionState::Playing);
        Ok(())
    }

    /// Resume (or start) media delivery.
    pub fn play(&mut self) {
        self.session_command(Method::Play, PendingRequest::Play);
    }

    /// Suspend media delivery.
    pub fn pause(&mut self) {
        self.session_command(Method::Pause, PendingRequest::Pause);
    }

    /// Tear the session down and release every resource. Idempotent.
    pub fn stop(&mut self) {
        self.monitor.request_stop();
        if self.released {
            return;
        }
        if self.session_id.is_some() {
            let request = self.session_request(Method::Teardown);
            if let Err(e) = self.send(request, PendingRequest::Teardown) {
                tracing::debug!(error = %e, "TEARDOWN not sent");
            }
        }
        self.release();
        if self.monitor.status() != ConnectionStatus::ConnectFailed {
            self.monitor.set_status(ConnectionStatus::Disconnected);
        }
        self.monitor.set_state(SessionState::Stopped);
    }

    fn session_command(&mut self, method: Method, pending: PendingRequest) {
        if self.released || self.monitor.state() == SessionState::Aborted {
            tracing::warn!(%method, "session is no longer active, command ignored");
            return;
        }
        if self.session_id.is_none() {
            tracing::warn!(%method, "no session established yet, command ignored");
            return;
        }
        let request = self.session_request(method);
        if let Err(e) = self.send(request, pending) {
            self.abort(&format!("{method} failed: {e}"));
        }
    }

    fn session_request(&self, method: Method) -> RtspRequest {
        let authorization = self.authorization(method, &self.url);
        RtspRequest::new(method, &self.url)
            .add_optional_header("Session", self.session_id.as_deref())
            .add_optional_header("Authorization", authorization.as_deref())
    }

    fn send_keepalive(&mut self) {
        if self.released || self.monitor.state() == SessionState::Aborted {
            return;
        }
        let authorization = self.authorization(Method::Options, &self.url);
        let request = RtspRequest::options(&self.url)
            .add_optional_header("Session", self.session_id.as_deref())
            .add_optional_header("Authorization", authorization.as_deref());
        if let Err(e) = self.send(request, PendingRequest::Options) {
            tracing::warn!(error = %e, "keepalive failed");
        }
    }

    fn authorization(&self, method: Method, uri: &str) -> Option<String> {
        let challenge = self.auth.as_ref()?;
        let credentials = self.credentials.as_ref()?;
        challenge.authorization(credentials, method, uri)
    }

    fn send(&mut self, request: RtspRequest, pending: PendingRequest) -> Result<()> {
        let method = request.method;
        let uri = request.uri.clone();
        let cseq = self.channel.send(request)?;
        tracing::debug!(cseq, %method, %uri, "RTSP request");
        self.pending.insert(cseq, pending);
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        tracing::warn!(reason, url = %self.url, "session aborted");
        if let Some(mut keepalive) = self.keepalive.take() {
            keepalive.cancel();
        }
        self.pending.clear();
        self.monitor.set_state(SessionState::Aborted);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(mut keepalive) = self.keepalive.take() {
            keepalive.cancel();
        }
        self.paths.close();
        self.channel.close();
        self.pending.clear();

        let stats = self.demux.stats();
        tracing::debug!(
            received = stats.received,
            discarded = stats.discarded,
            malformed = stats.malformed,
            lost = stats.lost,
            "session released"
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("mode", &self.mode)
            .field("session_id", &self.session_id)
            .field("video_payload_type", &self.video_payload_type)
            .field("video_codec", &self.video_codec)
            .field("transport", &self.transport)
            .field("state", &self.monitor.state())
            .finish_non_exhaustive()
    }
}
