use crate::transport::types::{Channel, ConnState, User};
use std::sync::mpsc::Sender;

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    ConnectionState(ConnState),
    Channels(Vec<Channel>),
    Users(Vec<User>),
    CurrentChannel(u32),
    Error(String),
}

/// Receives directory snapshots and connection state changes from the read loop.
pub trait EventSink: Send {
    fn publish(&mut self, event: TransportEvent);
}

impl EventSink for Sender<TransportEvent> {
    fn publish(&mut self, event: TransportEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

impl EventSink for Vec<TransportEvent> {
    fn publish(&mut self, event: TransportEvent) {
        self.push(event);
    }
}
