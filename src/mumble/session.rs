use crate::mumble::config::MumbleConfig;
use crate::mumble::control::{
    authenticate_packet, decode_control, join_channel_packet, plugin_context_packet,
    version_packet, ControlMessage, Outbound, StreamCloser, StreamConnector, TlsConnector,
};
use crate::mumble::envelope::{Envelope, EnvelopeReader};
use crate::mumble::events::{EventSink, TransportEvent};
use crate::mumble::keepalive::Keepalive;
use crate::mumble::message::MessageKind;
use crate::mumble::state::{ChannelStateUpdate, StateCache, UserStateUpdate};
use crate::mumble::voice::{AudioBackend, AudioPipeline, NoopAudioBackend};
use crate::transport::errors::TransportError;
use crate::transport::types::{Channel, ConnState, User};
use bytes::Bytes;
use log::{debug, info, warn};
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Connection flags shared between the read loop and its handles.
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    closing: AtomicBool,
    authenticated: AtomicBool,
    local_session: AtomicU32,
}

/// Cloneable access to a live connection from other threads.
#[derive(Clone)]
pub struct SessionHandle {
    outbound: Outbound,
    closer: Arc<dyn StreamCloser>,
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<u32> {
        self.shared
            .authenticated
            .load(Ordering::SeqCst)
            .then(|| self.shared.local_session.load(Ordering::SeqCst))
    }

    /// Asks the server to move the local user; the directory updates when the server echoes it.
    pub fn join_channel(&self, channel_id: u32) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let session = self
            .session_id()
            .ok_or_else(|| TransportError::Protocol("missing session id".to_string()))?;
        self.outbound.send(join_channel_packet(session, channel_id))
    }

    /// Writes a pre-built voice payload as a tunnel envelope.
    pub fn send_tunnel(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .send_envelope(Envelope::new(MessageKind::UdpTunnel, payload))
    }

    /// Shuts the stream so the blocked read loop returns and the session tears down.
    pub fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.closer.close() {
            debug!("closing stream failed: {err}");
        }
    }
}

pub struct MumbleSession {
    config: MumbleConfig,
    connector: Box<dyn StreamConnector>,
    audio_backend: Box<dyn AudioBackend>,
    events: Box<dyn EventSink>,
    conn_state: ConnState,
    state: StateCache,
    reader: Option<EnvelopeReader<Box<dyn Read + Send>>>,
    handle: Option<SessionHandle>,
    keepalive: Option<Keepalive>,
    audio: Option<AudioPipeline>,
    server_release: Option<String>,
}

impl MumbleSession {
    pub fn new_with_tls(config: MumbleConfig, events: Box<dyn EventSink>) -> Self {
        Self::with_connector(config, Box::new(TlsConnector), events)
    }

    pub fn with_connector(
        config: MumbleConfig,
        connector: Box<dyn StreamConnector>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            connector,
            audio_backend: Box::new(NoopAudioBackend),
            events,
            conn_state: ConnState::Disconnected,
            state: StateCache::new(),
            reader: None,
            handle: None,
            keepalive: None,
            audio: None,
            server_release: None,
        }
    }

    pub fn with_audio_backend(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.audio_backend = backend;
        self
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn_state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.state.local_session()
    }

    pub fn current_channel_id(&self) -> Option<u32> {
        self.state.current_channel_id()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.state.channels()
    }

    pub fn users(&self) -> Vec<User> {
        self.state.users()
    }

    pub fn server_release(&self) -> Option<&str> {
        self.server_release.as_deref()
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive.is_some()
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle.clone()
    }

    /// Opens the stream and sends Version then Authenticate.
    pub fn connect(&mut self) -> Result<SessionHandle, TransportError> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        self.config.validate()?;
        self.set_conn_state(ConnState::Connecting);

        let stream = match self.connector.connect(&self.config) {
            Ok(stream) => stream,
            Err(error) => return Err(self.fail(error)),
        };

        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);
        let handle = SessionHandle {
            outbound: Outbound::new(stream.writer),
            closer: stream.closer,
            shared,
        };
        self.reader = Some(EnvelopeReader::new(stream.reader));
        self.handle = Some(handle.clone());

        let greeting = handle
            .outbound
            .send(version_packet(&self.config))
            .and_then(|()| handle.outbound.send(authenticate_packet(&self.config)));
        if let Err(error) = greeting {
            return Err(self.fail(error));
        }

        self.set_conn_state(ConnState::Handshaking);
        Ok(handle)
    }

    /// Runs the read loop until the stream ends, then tears the connection down.
    ///
    /// Returns `Ok(())` when the server closes on an envelope boundary or the
    /// session was closed through a handle.
    pub fn run(&mut self) -> Result<(), TransportError> {
        let mut reader = self.reader.take().ok_or(TransportError::Disconnected)?;

        let outcome = loop {
            let envelope = match reader.recv() {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break Ok(()),
                Err(_) if self.is_closing() => break Ok(()),
                Err(error) => break Err(error),
            };
            if let Err(error) = self.handle_envelope(envelope) {
                break Err(error);
            }
        };

        match outcome {
            Ok(()) => {
                info!("connection closed");
                self.teardown();
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Dispatches one inbound envelope and forwards any resulting events.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let result = self.dispatch(envelope);
        for event in self.state.take_events() {
            self.events.publish(event);
        }
        result
    }

    /// Closes the stream and tears down without waiting for the read loop.
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        match envelope.kind {
            MessageKind::UdpTunnel => {
                self.handle_voice(&envelope.body);
                Ok(())
            }
            MessageKind::Ping => Ok(()),
            kind => match decode_control(&envelope)? {
                Some(message) => {
                    debug!(">>> {kind:?}");
                    self.apply_control_message(message)
                }
                None => {
                    info!("unhandled message type {kind:?}");
                    Ok(())
                }
            },
        }
    }

    fn apply_control_message(&mut self, message: ControlMessage) -> Result<(), TransportError> {
        match message {
            ControlMessage::ServerVersion { release } => {
                info!("server release {}", release.as_deref().unwrap_or("unknown"));
                self.server_release = release;
            }
            ControlMessage::Reject { reason } => {
                return Err(TransportError::Protocol(format!(
                    "server rejected connection: {reason}"
                )));
            }
            ControlMessage::ServerSync { session } => self.on_server_sync(session)?,
            ControlMessage::ChannelState { id, name } => {
                self.state
                    .apply_channel_state(ChannelStateUpdate { id, name });
            }
            ControlMessage::ChannelRemove { id } => self.state.apply_channel_remove(id),
            ControlMessage::UserState {
                session,
                name,
                channel_id,
            } => {
                self.state.apply_user_state(UserStateUpdate {
                    session,
                    name,
                    channel_id,
                });
            }
            ControlMessage::UserRemove { session } => self.state.apply_user_remove(session),
        }
        Ok(())
    }

    fn on_server_sync(&mut self, session: u32) -> Result<(), TransportError> {
        if self.conn_state == ConnState::Authenticated {
            warn!("ignoring repeated ServerSync for session {session}");
            return Ok(());
        }
        let handle = self.handle.clone().ok_or(TransportError::Disconnected)?;

        let current = self.state.authenticate(session);
        handle.shared.local_session.store(session, Ordering::SeqCst);
        handle.shared.authenticated.store(true, Ordering::SeqCst);
        info!(">>> ServerSync session {session} channel {current:?}");

        self.keepalive = Some(Keepalive::start(
            handle.outbound.clone(),
            self.config.keepalive_interval(),
        )?);
        handle.outbound.send(plugin_context_packet(session))?;

        self.audio = match AudioPipeline::open(self.audio_backend.as_mut()) {
            Ok(pipeline) => Some(pipeline),
            Err(error) => {
                warn!("audio unavailable, voice will be dropped: {error}");
                None
            }
        };

        self.set_conn_state(ConnState::Authenticated);
        self.state.publish_directory();
        Ok(())
    }

    fn handle_voice(&mut self, payload: &Bytes) {
        match self.audio.as_mut() {
            Some(audio) => {
                audio.handle_tunnel(payload);
            }
            None => debug!("voice packet before audio is ready, dropped"),
        }
    }

    fn is_closing(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.shared.closing.load(Ordering::SeqCst))
    }

    fn set_conn_state(&mut self, next: ConnState) {
        self.conn_state = next;
        self.events.publish(TransportEvent::ConnectionState(next));
    }

    fn fail(&mut self, error: TransportError) -> TransportError {
        warn!("session failed: {error}");
        self.events.publish(TransportEvent::Error(error.to_string()));
        self.teardown();
        error
    }

    fn teardown(&mut self) {
        if let Some(mut keepalive) = self.keepalive.take() {
            keepalive.stop();
        }
        self.audio = None;
        self.reader = None;
        self.server_release = None;
        if let Some(handle) = self.handle.take() {
            handle.close();
            handle.shared.connected.store(false, Ordering::SeqCst);
            handle.shared.authenticated.store(false, Ordering::SeqCst);
        }
        self.state = StateCache::new();
        if self.conn_state != ConnState::Disconnected {
            self.set_conn_state(ConnState::Disconnected);
        }
    }
}

impl Drop for MumbleSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.disconnect();
        }
    }
}
