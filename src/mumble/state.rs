use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::mumble::events::TransportEvent;
use crate::transport::types::{Channel, User};

/// Channel and user directory for one connection.
///
/// Mutations queue snapshot events only after authentication; earlier
/// mutations are applied silently. Every published snapshot recounts
/// per-channel occupancy first.
#[derive(Debug, Default)]
pub struct StateCache {
    channels: HashMap<u32, Channel>,
    users: HashMap<u32, User>,
    local_session: Option<u32>,
    current_channel_id: Option<u32>,
    authenticated: bool,
    events: Vec<TransportEvent>,
}

#[derive(Debug)]
pub struct ChannelStateUpdate {
    pub id: u32,
    pub name: Option<String>,
}

#[derive(Debug)]
pub struct UserStateUpdate {
    pub session: u32,
    pub name: Option<String>,
    pub channel_id: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
enum Published {
    Channels,
    Users,
    CurrentChannel(u32),
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn user(&self, session: u32) -> Option<&User> {
        self.users.get(&session)
    }

    pub fn local_session(&self) -> Option<u32> {
        self.local_session
    }

    pub fn current_channel_id(&self) -> Option<u32> {
        self.current_channel_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn apply_channel_state(&mut self, update: ChannelStateUpdate) {
        let entry = self.channels.entry(update.id).or_insert_with(|| Channel {
            id: update.id,
            name: String::new(),
            user_count: 0,
        });

        if let Some(name) = update.name {
            entry.name = name;
        }

        self.publish(Published::Channels);
    }

    /// Notifies even when `id` was never present, as the server expects.
    pub fn apply_channel_remove(&mut self, id: u32) {
        self.channels.remove(&id);
        self.publish(Published::Channels);
    }

    /// Only channel reassignments publish; renames are applied silently.
    pub fn apply_user_state(&mut self, update: UserStateUpdate) {
        let moved_to = match self.users.entry(update.session) {
            Entry::Vacant(slot) => {
                slot.insert(User {
                    session: update.session,
                    name: update.name.unwrap_or_default(),
                    channel_id: update.channel_id.unwrap_or(0),
                });
                update.channel_id
            }
            Entry::Occupied(slot) => {
                let user = slot.into_mut();
                if let Some(name) = update.name {
                    user.name = name;
                }
                match update.channel_id {
                    Some(channel_id) if channel_id != user.channel_id => {
                        user.channel_id = channel_id;
                        Some(channel_id)
                    }
                    _ => None,
                }
            }
        };

        let Some(channel_id) = moved_to else {
            return;
        };
        if self.local_session == Some(update.session) {
            self.current_channel_id = Some(channel_id);
            self.publish(Published::CurrentChannel(channel_id));
        }
        self.publish(Published::Users);
    }

    pub fn apply_user_remove(&mut self, session: u32) {
        self.users.remove(&session);
        self.publish(Published::Users);
    }

    /// Marks the directory authenticated and seeds the current channel from
    /// the local user's entry, if the server already announced it.
    pub fn authenticate(&mut self, session: u32) -> Option<u32> {
        self.local_session = Some(session);
        self.authenticated = true;
        self.current_channel_id = self.users.get(&session).map(|user| user.channel_id);
        self.current_channel_id
    }

    /// Publishes full channel and user snapshots.
    pub fn publish_directory(&mut self) {
        self.publish(Published::Channels);
        self.publish(Published::Users);
    }

    /// Users in channels the directory no longer holds are skipped.
    pub fn recount(&mut self) {
        for channel in self.channels.values_mut() {
            channel.user_count = 0;
        }

        for user in self.users.values() {
            if let Some(channel) = self.channels.get_mut(&user.channel_id) {
                channel.user_count += 1;
            }
        }
    }

    fn publish(&mut self, published: Published) {
        if !self.authenticated {
            return;
        }

        self.recount();
        let event = match published {
            Published::Channels => TransportEvent::Channels(self.channels()),
            Published::Users => TransportEvent::Users(self.users()),
            Published::CurrentChannel(channel_id) => TransportEvent::CurrentChannel(channel_id),
        };
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = self.channels.values().cloned().collect::<Vec<_>>();
        channels.sort_by_key(|channel| channel.id);
        channels
    }

    pub fn users(&self) -> Vec<User> {
        let mut users = self.users.values().cloned().collect::<Vec<_>>();
        users.sort_by_key(|user| user.session);
        users
    }
}
