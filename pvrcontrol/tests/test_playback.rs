//! Playback state tracker behavior.

mod common;

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use common::Harness;
use pvrclient::{ChannelGroup, ClientId, Recording};
use pvrcontrol::PlayingItem;

fn recording(client_id: ClientId, id: &str) -> Recording {
    Recording {
        recording_id: id.to_string(),
        client_id,
        title: id.to_string(),
    }
}

#[test]
fn exactly_one_slot_is_set_per_start() {
    let h = Harness::new();
    let channel = h.channel(1, "One");
    let tag = common::epg_tag(&channel, 10, "Show", 0);

    h.playback.on_playback_started(&PlayingItem::Channel(channel.clone()));
    assert!(h.playback.is_playing_channel(&channel));
    assert!(h.playback.playing_recording().is_none());
    assert!(h.playback.playing_epg_tag().is_none());

    h.playback.on_playback_started(&PlayingItem::EpgTag(tag.clone()));
    assert!(h.playback.playing_channel().is_none());
    assert!(h.playback.is_playing_epg_tag(&tag));

    h.playback
        .on_playback_started(&PlayingItem::Recording(recording(h.client_id, "rec-1")));
    assert!(h.playback.playing_channel().is_none());
    assert!(h.playback.playing_epg_tag().is_none());
    assert!(h.playback.playing_recording().is_some());
}

#[test]
fn fast_channel_change_never_leaves_two_slots() {
    let h = Harness::new();
    let one = h.channel(1, "One");
    let two = h.channel(2, "Two");

    h.playback.on_playback_started(&PlayingItem::Channel(one.clone()));
    h.playback.on_playback_started(&PlayingItem::Channel(two.clone()));

    assert!(!h.playback.is_playing_channel(&one));
    assert!(h.playback.is_playing_channel(&two));
    assert_eq!(h.playback.playing_client_id(), h.client_id);
}

#[test]
fn stop_clears_only_the_matching_target() {
    let h = Harness::new();
    let one = h.channel(1, "One");
    let two = h.channel(2, "Two");

    h.playback.on_playback_started(&PlayingItem::Channel(one.clone()));

    // A stop for a different channel is stale and changes nothing.
    assert!(!h.playback.on_playback_stopped(&PlayingItem::Channel(two)));
    assert!(h.playback.is_playing_channel(&one));

    assert!(h.playback.on_playback_stopped(&PlayingItem::Channel(one.clone())));
    assert!(!h.playback.is_playing());

    // Second stop reports "nothing changed".
    assert!(!h.playback.on_playback_stopped(&PlayingItem::Channel(one)));
}

#[test]
fn ended_behaves_like_stopped() {
    let h = Harness::new();
    let channel = h.channel(1, "One");

    h.playback.on_playback_started(&PlayingItem::Channel(channel.clone()));
    assert!(h.playback.on_playback_ended(&PlayingItem::Channel(channel)));
    assert!(!h.playback.is_playing());
}

#[test]
fn zero_delay_persists_last_watched_synchronously() {
    let h = Harness::new();
    let channel = h.channel(1, "One");

    h.playback.on_playback_started(&PlayingItem::Channel(channel));
    let writes = h.store.channel_writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, 1);
}

#[test]
fn deferred_last_watched_fires_exactly_once() {
    let h = Harness::new();
    h.config.set_last_watched_delay(1).unwrap();
    let channel = h.channel(1, "One");

    h.playback.on_playback_started(&PlayingItem::Channel(channel));
    assert!(h.store.channel_writes.lock().unwrap().is_empty());

    thread::sleep(StdDuration::from_millis(1500));
    assert_eq!(h.store.channel_writes.lock().unwrap().len(), 1);

    // Nothing further happens on stop once the delay already fired.
    thread::sleep(StdDuration::from_millis(200));
    assert_eq!(h.store.channel_writes.lock().unwrap().len(), 1);
}

#[test]
fn stopping_early_cancels_the_deferred_write() {
    let h = Harness::new();
    h.config.set_last_watched_delay(1).unwrap();
    let channel = h.channel(1, "One");

    h.playback.on_playback_started(&PlayingItem::Channel(channel.clone()));
    thread::sleep(StdDuration::from_millis(100));
    assert!(h.playback.on_playback_stopped(&PlayingItem::Channel(channel)));

    // The channel was not watched long enough to count.
    thread::sleep(StdDuration::from_millis(1400));
    assert!(h.store.channel_writes.lock().unwrap().is_empty());
}

#[test]
fn starting_a_channel_selects_a_group_containing_it() {
    let h = Harness::new();
    let group_a = ChannelGroup {
        group_id: 1,
        name: "Favourites".to_string(),
        is_radio: false,
    };
    let group_b = ChannelGroup {
        group_id: 2,
        name: "All channels".to_string(),
        is_radio: false,
    };
    h.groups.add_group(group_a.clone(), vec![1]);
    h.groups.add_group(group_b.clone(), vec![1, 2]);

    // No active group yet: the first group (in list order) containing the
    // channel wins.
    h.playback.on_playback_started(&PlayingItem::Channel(h.channel(1, "One")));
    assert_eq!(h.playback.playing_group(false).unwrap().group_id, 1);

    // The already-selected group is preferred while it still contains the
    // playing channel.
    h.playback.set_playing_group(group_b.clone());
    h.playback.on_playback_started(&PlayingItem::Channel(h.channel(1, "One")));
    assert_eq!(h.playback.playing_group(false).unwrap().group_id, 2);

    // A channel outside the selected group forces a re-selection.
    h.playback.set_playing_group(group_a);
    h.playback.on_playback_started(&PlayingItem::Channel(h.channel(2, "Two")));
    assert_eq!(h.playback.playing_group(false).unwrap().group_id, 2);
}

#[test]
fn group_last_watched_is_persisted_with_the_channel() {
    let h = Harness::new();
    let group = ChannelGroup {
        group_id: 7,
        name: "Favourites".to_string(),
        is_radio: false,
    };
    h.groups.add_group(group, vec![1]);

    h.playback.on_playback_started(&PlayingItem::Channel(h.channel(1, "One")));

    assert_eq!(h.store.channel_writes.lock().unwrap().len(), 1);
    let group_writes = h.store.group_writes.lock().unwrap();
    assert_eq!(group_writes.len(), 1);
    assert_eq!(group_writes[0].0, 7);
}

#[test]
fn playback_time_reads_through_the_pipeline_clock() {
    let h = Harness::new();

    let start = Utc::now() - Duration::minutes(5);
    *h.clock.start.lock().unwrap() = Some(start);
    *h.clock.elapsed.lock().unwrap() = StdDuration::from_secs(120);
    assert_eq!(h.playback.playback_time(), start + Duration::seconds(120));

    // No start time reported: fall back to "now".
    *h.clock.start.lock().unwrap() = None;
    let before = Utc::now();
    let reported = h.playback.playback_time();
    assert!(reported >= before && reported <= Utc::now());
}
