//! Playback state tracker.
//!
//! Serializes "what is currently playing" into a single queryable slot and
//! manages the delayed last-watched write. Mutating operations are assumed
//! to be externally serialized per playback session (at most one playback
//! transition in flight at a time); queries may run from any thread.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use pvrclient::{Channel, ChannelGroup, ClientId, EpgTag, Recording};
use pvrconfig::Config;

use crate::deferred::DeferredCall;
use crate::events::{CoreEvent, CoreEventBus};
use crate::providers::{GroupProvider, LastWatchedStore, PlaybackClock};

/// What the host has started playing. Exactly one kind at a time.
#[derive(Clone, Debug)]
pub enum PlayingItem {
    Channel(Channel),
    Recording(Recording),
    EpgTag(EpgTag),
}

struct PlaybackSlot {
    channel: Option<Channel>,
    recording: Option<Recording>,
    epg_tag: Option<EpgTag>,
    client_id: ClientId,
    group_tv: Option<ChannelGroup>,
    group_radio: Option<ChannelGroup>,
    /// Delayed last-watched write for the playing channel.
    pending_update: Option<DeferredCall>,
}

impl PlaybackSlot {
    fn new() -> Self {
        Self {
            channel: None,
            recording: None,
            epg_tag: None,
            client_id: ClientId::INVALID,
            group_tv: None,
            group_radio: None,
            pending_update: None,
        }
    }

    fn clear_targets(&mut self) {
        self.channel = None;
        self.recording = None;
        self.epg_tag = None;
        self.client_id = ClientId::INVALID;
        if let Some(pending) = self.pending_update.take() {
            pending.cancel();
        }
    }
}

pub struct PlaybackTracker {
    slot: Mutex<PlaybackSlot>,
    groups: Arc<dyn GroupProvider>,
    store: Arc<dyn LastWatchedStore>,
    clock: Arc<dyn PlaybackClock>,
    config: Arc<Config>,
    events: CoreEventBus,
}

impl PlaybackTracker {
    pub fn new(
        groups: Arc<dyn GroupProvider>,
        store: Arc<dyn LastWatchedStore>,
        clock: Arc<dyn PlaybackClock>,
        config: Arc<Config>,
        events: CoreEventBus,
    ) -> Self {
        Self {
            slot: Mutex::new(PlaybackSlot::new()),
            groups,
            store,
            clock,
            config,
            events,
        }
    }

    /// Record that playback of `item` started. Clears every target slot,
    /// then sets exactly one.
    pub fn on_playback_started(&self, item: &PlayingItem) {
        let client_id;
        {
            let mut slot = self.slot.lock().unwrap();
            slot.clear_targets();

            match item {
                PlayingItem::Channel(channel) => {
                    slot.client_id = channel.client_id;
                    slot.channel = Some(channel.clone());
                    self.update_active_group(&mut slot, channel);
                    self.schedule_last_watched(&mut slot, channel);
                }
                PlayingItem::Recording(recording) => {
                    slot.client_id = recording.client_id;
                    slot.recording = Some(recording.clone());
                }
                PlayingItem::EpgTag(tag) => {
                    slot.client_id = tag.channel.client_id;
                    slot.epg_tag = Some(tag.clone());
                }
            }
            client_id = slot.client_id;
        }

        info!(client = %client_id, "Playback started");
        self.events.broadcast(CoreEvent::PlaybackStarted { client_id });
    }

    /// User stopped playback. Clears the matching slot only; returns
    /// whether state actually changed so callers can skip redundant
    /// notifications.
    pub fn on_playback_stopped(&self, item: &PlayingItem) -> bool {
        let changed;
        {
            let mut slot = self.slot.lock().unwrap();
            changed = match item {
                PlayingItem::Channel(channel) => slot
                    .channel
                    .as_ref()
                    .is_some_and(|playing| same_channel(playing, channel)),
                PlayingItem::Recording(recording) => slot
                    .recording
                    .as_ref()
                    .is_some_and(|playing| playing.recording_id == recording.recording_id),
                PlayingItem::EpgTag(tag) => slot.epg_tag.as_ref().is_some_and(|playing| {
                    playing.event_id == tag.event_id
                        && same_channel(&playing.channel, &tag.channel)
                }),
            };
            if changed {
                // A still-pending deferred write means the channel was not
                // watched long enough to count.
                slot.clear_targets();
            }
        }

        if changed {
            debug!("Playback stopped");
            self.events.broadcast(CoreEvent::PlaybackStopped);
        }
        changed
    }

    /// Playback reached its natural end. Same bookkeeping as a stop.
    pub fn on_playback_ended(&self, item: &PlayingItem) -> bool {
        self.on_playback_stopped(item)
    }

    pub fn is_playing(&self) -> bool {
        let slot = self.slot.lock().unwrap();
        slot.channel.is_some() || slot.recording.is_some() || slot.epg_tag.is_some()
    }

    pub fn is_playing_channel(&self, channel: &Channel) -> bool {
        let slot = self.slot.lock().unwrap();
        slot.channel
            .as_ref()
            .is_some_and(|playing| same_channel(playing, channel))
    }

    pub fn is_playing_recording(&self, recording: &Recording) -> bool {
        let slot = self.slot.lock().unwrap();
        slot.recording
            .as_ref()
            .is_some_and(|playing| playing.recording_id == recording.recording_id)
    }

    pub fn is_playing_epg_tag(&self, tag: &EpgTag) -> bool {
        let slot = self.slot.lock().unwrap();
        slot.epg_tag.as_ref().is_some_and(|playing| {
            playing.event_id == tag.event_id && same_channel(&playing.channel, &tag.channel)
        })
    }

    pub fn playing_channel(&self) -> Option<Channel> {
        self.slot.lock().unwrap().channel.clone()
    }

    pub fn playing_recording(&self) -> Option<Recording> {
        self.slot.lock().unwrap().recording.clone()
    }

    pub fn playing_epg_tag(&self) -> Option<EpgTag> {
        self.slot.lock().unwrap().epg_tag.clone()
    }

    pub fn playing_client_id(&self) -> ClientId {
        self.slot.lock().unwrap().client_id
    }

    /// Wall-clock position of the current playback: pipeline start time
    /// plus elapsed time, falling back to now. Read-through, not owned
    /// state.
    pub fn playback_time(&self) -> DateTime<Utc> {
        match self.clock.start_time() {
            Some(start) => {
                start
                    + Duration::from_std(self.clock.elapsed()).unwrap_or_else(|_| Duration::zero())
            }
            None => Utc::now(),
        }
    }

    /// Select the active group for the group's own radio/TV domain.
    pub fn set_playing_group(&self, group: ChannelGroup) {
        let mut slot = self.slot.lock().unwrap();
        if group.is_radio {
            slot.group_radio = Some(group);
        } else {
            slot.group_tv = Some(group);
        }
    }

    pub fn playing_group(&self, is_radio: bool) -> Option<ChannelGroup> {
        let slot = self.slot.lock().unwrap();
        if is_radio {
            slot.group_radio.clone()
        } else {
            slot.group_tv.clone()
        }
    }

    /// Keep the selected group when it still contains the channel, else
    /// fall back to the first group (in list order) containing it.
    fn update_active_group(&self, slot: &mut PlaybackSlot, channel: &Channel) {
        let containing = self.groups.groups_for_channel(channel);
        let active = if channel.is_radio {
            &mut slot.group_radio
        } else {
            &mut slot.group_tv
        };
        let keep = active
            .as_ref()
            .is_some_and(|current| containing.iter().any(|g| g.group_id == current.group_id));
        if !keep {
            *active = containing.into_iter().next();
        }
    }

    fn schedule_last_watched(&self, slot: &mut PlaybackSlot, channel: &Channel) {
        let group = if channel.is_radio {
            slot.group_radio.clone()
        } else {
            slot.group_tv.clone()
        };
        let delay = self.config.get_last_watched_delay();
        if delay > 0 {
            let store = Arc::clone(&self.store);
            let channel = channel.clone();
            slot.pending_update = Some(DeferredCall::spawn(
                StdDuration::from_secs(delay as u64),
                move || persist_last_watched(store.as_ref(), &channel, group.as_ref()),
            ));
        } else {
            persist_last_watched(self.store.as_ref(), channel, group.as_ref());
        }
    }
}

fn same_channel(a: &Channel, b: &Channel) -> bool {
    a.channel_id == b.channel_id && a.client_id == b.client_id
}

fn persist_last_watched(
    store: &dyn LastWatchedStore,
    channel: &Channel,
    group: Option<&ChannelGroup>,
) {
    let now = Utc::now();
    if let Err(err) = store.set_channel_last_watched(channel, now) {
        warn!(channel = %channel.name, error = %err, "Failed to persist channel last watched");
    }
    if let Some(group) = group {
        if let Err(err) = store.set_group_last_watched(group, now) {
            warn!(group = %group.name, error = %err, "Failed to persist group last watched");
        }
    }
}
