//! Per-connection link correlation.
//!
//! An AMQP link has two independent endpoints: the client names it with one
//! `(channel, handle)` pair, the server replies with its own. The state map
//! observes OPEN and ATTACH frames in both directions and maintains enough
//! indexes that any later frame carrying a `(channel, handle)` can be
//! resolved, on either side, to its controlling ATTACH and from there to an
//! entity address, role, and link name.
//!
//! Both direction tasks of a mirror update the map concurrently; writes only
//! happen for OPEN and ATTACH frames, so contention is negligible.

use std::sync::RwLock;

use dashmap::DashMap;

use crate::codec::body::{Attach, Body, Open, Role};
use crate::codec::Frame;
use crate::error::StateError;
use crate::Direction;

/// An ATTACH captured by the state map, with the channel it arrived on.
#[derive(Debug, Clone)]
pub struct AttachInfo {
    pub channel: u16,
    pub body: Attach,
}

impl AttachInfo {
    /// The link's entity address, per the direction-adjusted role rule.
    pub fn address(&self, direction: Direction) -> Option<&str> {
        self.body.address(direction)
    }
}

/// An OPEN captured by the state map.
#[derive(Debug, Clone)]
pub struct OpenInfo {
    pub channel: u16,
    pub body: Open,
}

type ChannelHandle = (u16, u32);

/// Correlation table for one mirrored connection.
#[derive(Debug, Default)]
pub struct StateMap {
    /// Client ATTACHes by role and link name, used to pair the server's
    /// ATTACH reply.
    local_by_role_and_name: DashMap<(Role, String), AttachInfo>,

    local_attach: DashMap<ChannelHandle, AttachInfo>,
    remote_attach: DashMap<ChannelHandle, AttachInfo>,

    /// Cross-side maps. Populated only once the server's ATTACH reply has
    /// been observed.
    local_to_remote: DashMap<ChannelHandle, AttachInfo>,
    remote_to_local: DashMap<ChannelHandle, AttachInfo>,

    local_open: RwLock<Option<OpenInfo>>,
    remote_open: RwLock<Option<OpenInfo>>,
}

impl StateMap {
    pub fn new() -> StateMap {
        StateMap::default()
    }

    /// Observe a frame travelling in `direction`. Only OPEN and ATTACH
    /// update the map; everything else is a no-op.
    ///
    /// # Errors
    ///
    /// A server ATTACH that matches no prior client ATTACH with the same
    /// link name and inverted role is a corruption fault; callers abort the
    /// connection.
    pub fn record(&self, direction: Direction, frame: &Frame) -> Result<(), StateError> {
        match &frame.body {
            Body::Open(open) => {
                let info = OpenInfo {
                    channel: frame.header.channel,
                    body: open.clone(),
                };
                let slot = match direction {
                    Direction::Out => &self.local_open,
                    Direction::In => &self.remote_open,
                };
                *slot.write().expect("open slot lock") = Some(info);
                Ok(())
            }
            Body::Attach(attach) => {
                let info = AttachInfo {
                    channel: frame.header.channel,
                    body: attach.clone(),
                };
                match direction {
                    Direction::Out => {
                        self.record_local_attach(info);
                        Ok(())
                    }
                    Direction::In => self.record_remote_attach(info),
                }
            }
            _ => Ok(()),
        }
    }

    /// The client's ATTACH, indexed by its own identifiers and by
    /// `(role, name)` for pairing the server's reply.
    fn record_local_attach(&self, info: AttachInfo) {
        self.local_by_role_and_name
            .insert((info.body.role, info.body.name.clone()), info.clone());
        self.local_attach
            .insert((info.channel, info.body.handle), info);
    }

    /// The server's ATTACH reply: the counterpart has the same link name and
    /// the opposite role. Installing both cross-side maps makes
    /// [`StateMap::corresponding_attach`] valid from here on.
    fn record_remote_attach(&self, info: AttachInfo) -> Result<(), StateError> {
        self.remote_attach
            .insert((info.channel, info.body.handle), info.clone());

        let key = (info.body.role.invert(), info.body.name.clone());
        let Some(local) = self.local_by_role_and_name.get(&key).map(|e| e.clone()) else {
            return Err(StateError::correlation_fault(
                &info.body.name,
                info.body.role,
            ));
        };

        self.local_to_remote
            .insert((local.channel, local.body.handle), info.clone());
        self.remote_to_local
            .insert((info.channel, info.body.handle), local);
        Ok(())
    }

    /// The ATTACH installed for `direction`'s own side of a link.
    pub fn attach_for(
        &self,
        direction: Direction,
        channel: u16,
        handle: u32,
    ) -> Option<AttachInfo> {
        let table = match direction {
            Direction::Out => &self.local_attach,
            Direction::In => &self.remote_attach,
        };
        table.get(&(channel, handle)).map(|e| e.clone())
    }

    /// The ATTACH for the *other* side of a link.
    ///
    /// With `local_to_remote` true, pass client identifiers and get the
    /// server's ATTACH; with false, the reverse. Valid only after both
    /// ATTACHes for the link have been observed.
    pub fn corresponding_attach(
        &self,
        local_to_remote: bool,
        channel: u16,
        handle: u32,
    ) -> Option<AttachInfo> {
        let table = if local_to_remote {
            &self.local_to_remote
        } else {
            &self.remote_to_local
        };
        table.get(&(channel, handle)).map(|e| e.clone())
    }

    /// The OPEN observed on `direction`'s side, if any. The local OPEN's
    /// container-id is the logical connection identifier in trace lines.
    pub fn open_frame(&self, direction: Direction) -> Option<OpenInfo> {
        let slot = match direction {
            Direction::Out => &self.local_open,
            Direction::In => &self.remote_open,
        };
        slot.read().expect("open slot lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::{Source, Target};

    fn attach_frame(channel: u16, handle: u32, name: &str, role: Role) -> Frame {
        Frame::new(
            channel,
            Body::Attach(Attach {
                name: name.to_string(),
                handle,
                role,
                snd_settle_mode: None,
                rcv_settle_mode: None,
                source: Some(Source {
                    address: Some(format!("source-{name}")),
                    ..Source::default()
                }),
                target: Some(Target {
                    address: Some(format!("target-{name}")),
                    ..Target::default()
                }),
                unsettled: None,
                incomplete_unsettled: false,
                initial_delivery_count: None,
                max_message_size: None,
                offered_capabilities: Vec::new(),
                desired_capabilities: Vec::new(),
                properties: None,
            }),
        )
    }

    fn open_frame(container_id: &str) -> Frame {
        Frame::new(
            0,
            Body::Open(Open {
                container_id: container_id.to_string(),
                ..Open::default()
            }),
        )
    }

    #[test]
    fn test_open_frames_tracked_per_side() {
        let sm = StateMap::new();
        sm.record(Direction::Out, &open_frame("client-1")).unwrap();
        sm.record(Direction::In, &open_frame("server-9")).unwrap();

        assert_eq!(
            sm.open_frame(Direction::Out).unwrap().body.container_id,
            "client-1"
        );
        assert_eq!(
            sm.open_frame(Direction::In).unwrap().body.container_id,
            "server-9"
        );
    }

    #[test]
    fn test_attach_pairing_installs_forward_maps() {
        let sm = StateMap::new();
        // Client opens a sender link on channel 0, handle 1.
        sm.record(Direction::Out, &attach_frame(0, 1, "link-a", Role::Sender))
            .unwrap();
        // Before the reply, no correspondence exists.
        assert!(sm.corresponding_attach(true, 0, 1).is_none());

        // Server replies on channel 5, handle 3, with the inverted role.
        sm.record(Direction::In, &attach_frame(5, 3, "link-a", Role::Receiver))
            .unwrap();

        let remote = sm.corresponding_attach(true, 0, 1).unwrap();
        assert_eq!(remote.channel, 5);
        assert_eq!(remote.body.handle, 3);
        assert_eq!(remote.body.role, Role::Receiver);

        let local = sm.corresponding_attach(false, 5, 3).unwrap();
        assert_eq!(local.channel, 0);
        assert_eq!(local.body.handle, 1);
        assert_eq!(local.body.role, Role::Sender);
    }

    #[test]
    fn test_attach_lookup_per_side() {
        let sm = StateMap::new();
        sm.record(Direction::Out, &attach_frame(0, 1, "link-a", Role::Sender))
            .unwrap();

        assert!(sm.attach_for(Direction::Out, 0, 1).is_some());
        assert!(sm.attach_for(Direction::In, 0, 1).is_none());
    }

    #[test]
    fn test_unmatched_remote_attach_is_a_correlation_fault() {
        let sm = StateMap::new();
        let err = sm
            .record(Direction::In, &attach_frame(0, 0, "ghost", Role::Receiver))
            .unwrap_err();
        assert!(matches!(err, StateError::CorrelationFault { .. }));
    }

    #[test]
    fn test_same_name_same_role_does_not_pair() {
        let sm = StateMap::new();
        sm.record(Direction::Out, &attach_frame(0, 1, "link-a", Role::Sender))
            .unwrap();
        // Reply with the same (not inverted) role must not match.
        let err = sm
            .record(Direction::In, &attach_frame(5, 3, "link-a", Role::Sender))
            .unwrap_err();
        assert!(matches!(err, StateError::CorrelationFault { .. }));
    }

    #[test]
    fn test_non_link_frames_are_ignored() {
        let sm = StateMap::new();
        sm.record(Direction::Out, &Frame::new(0, Body::Empty)).unwrap();
        assert!(sm.open_frame(Direction::Out).is_none());
    }
}
