//! Shared mocks and helpers for the pvrcontrol integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use pvrclient::{
    Channel, ChannelGroup, ClientCapabilities, ClientError, ClientId, ClientResult, CreateStatus,
    EpgTag, PvrClient, Recording, Timer,
};
use pvrconfig::Config;
use pvrcontrol::{
    ChannelSwitcher, ClientFactory, ClientRegistry, CoreEventBus, EpgProvider, GroupProvider,
    InstantRecordOption, InstantRecordPrompt, LastWatchedStore, NotificationSink,
    ParentalCheckResult, ParentalGuard, PlaybackClock, PlaybackTracker, ReminderAnnouncement,
    ReminderChoice, ReminderPrompt, Services, Severity, TimerEngine,
};

static INIT_TRACING: Once = Once::new();

/// Route tracing output to the test harness, once per binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ---------------------------------------------------------------- clients

/// Scriptable backend client.
#[derive(Debug)]
pub struct MockClient {
    id: ClientId,
    name: String,
    pub caps: ClientCapabilities,
    pub create_status: Mutex<CreateStatus>,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub timers: Mutex<Vec<Timer>>,
    /// Fail this many upcoming add_timer calls.
    pub fail_next_adds: AtomicUsize,
    pub fail_timers: Mutex<Option<ClientError>>,
    pub fail_delete: Mutex<Option<ClientError>>,
    pub add_calls: AtomicUsize,
    next_timer_id: AtomicU32,
}

impl MockClient {
    pub fn new(id: ClientId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            caps: ClientCapabilities {
                supports_timers: true,
                supports_recordings: true,
                supports_epg: true,
                supports_channel_scan: true,
                supports_channel_settings: false,
                supports_providers: false,
            },
            create_status: Mutex::new(CreateStatus::Ok),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            timers: Mutex::new(Vec::new()),
            fail_next_adds: AtomicUsize::new(0),
            fail_timers: Mutex::new(None),
            fail_delete: Mutex::new(None),
            add_calls: AtomicUsize::new(0),
            next_timer_id: AtomicU32::new(1000),
        }
    }

    pub fn without_timers(id: ClientId, name: &str) -> Self {
        let mut client = Self::new(id, name);
        client.caps.supports_timers = false;
        client
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Seed a backend-held timer, assigning a backend id when missing.
    pub fn seed_timer(&self, mut timer: Timer) -> u32 {
        if timer.timer_id == 0 {
            timer.timer_id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        }
        let id = timer.timer_id;
        self.timers.lock().unwrap().push(timer);
        id
    }
}

impl PvrClient for MockClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ClientCapabilities {
        self.caps
    }

    fn create(&self) -> CreateStatus {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.create_status.lock().unwrap()
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn timers(&self) -> ClientResult<Vec<Timer>> {
        if let Some(err) = self.fail_timers.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.timers.lock().unwrap().clone())
    }

    fn add_timer(&self, timer: &Timer) -> ClientResult<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next_adds.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_adds.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::Rejected("backend refused the timer".into()));
        }

        let mut stored = timer.clone();
        if stored.timer_id == 0 {
            stored.timer_id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        }
        // A timer whose window already started begins recording right away.
        if !stored.reminder && stored.start <= Utc::now() && stored.end > Utc::now() {
            stored.state = pvrclient::TimerState::Recording;
        }
        self.timers.lock().unwrap().push(stored);
        Ok(())
    }

    fn update_timer(&self, timer: &Timer) -> ClientResult<()> {
        let mut timers = self.timers.lock().unwrap();
        match timers.iter_mut().find(|t| t.timer_id == timer.timer_id) {
            Some(slot) => {
                *slot = timer.clone();
                Ok(())
            }
            None => Err(ClientError::InvalidParameters("unknown timer".into())),
        }
    }

    fn delete_timer(&self, timer: &Timer, _force: bool) -> ClientResult<()> {
        if let Some(err) = self.fail_delete.lock().unwrap().clone() {
            return Err(err);
        }
        let mut timers = self.timers.lock().unwrap();
        let before = timers.len();
        timers.retain(|t| t.timer_id != timer.timer_id);
        if timers.len() == before {
            return Err(ClientError::InvalidParameters("unknown timer".into()));
        }
        Ok(())
    }

    fn recordings(&self) -> ClientResult<Vec<Recording>> {
        Ok(Vec::new())
    }
}

/// Factory handing out pre-registered mock clients; unknown addons get a
/// fresh default client.
#[derive(Default)]
pub struct MockFactory {
    pub clients: Mutex<HashMap<String, Arc<MockClient>>>,
    pub builds: AtomicUsize,
}

impl MockFactory {
    pub fn with_client(self, addon_id: &str, client: Arc<MockClient>) -> Self {
        self.clients
            .lock()
            .unwrap()
            .insert(addon_id.to_string(), client);
        self
    }
}

impl ClientFactory for MockFactory {
    fn build(&self, addon_id: &str, client_id: ClientId) -> Result<Arc<dyn PvrClient>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let mut clients = self.clients.lock().unwrap();
        let client = clients
            .entry(addon_id.to_string())
            .or_insert_with(|| Arc::new(MockClient::new(client_id, addon_id)));
        Ok(Arc::clone(client) as Arc<dyn PvrClient>)
    }
}

// ---------------------------------------------------------- collaborators

#[derive(Default)]
pub struct MockEpg {
    pub now: Mutex<Option<EpgTag>>,
    pub next: Mutex<Option<EpgTag>>,
}

impl EpgProvider for MockEpg {
    fn now_on(&self, _channel: &Channel) -> Option<EpgTag> {
        self.now.lock().unwrap().clone()
    }

    fn next_on(&self, _channel: &Channel) -> Option<EpgTag> {
        self.next.lock().unwrap().clone()
    }
}

/// Group provider backed by (group, member channel ids) pairs in list
/// order.
#[derive(Default)]
pub struct MockGroups {
    pub groups: Mutex<Vec<(ChannelGroup, Vec<u32>)>>,
}

impl MockGroups {
    pub fn add_group(&self, group: ChannelGroup, members: Vec<u32>) {
        self.groups.lock().unwrap().push((group, members));
    }
}

impl GroupProvider for MockGroups {
    fn groups_for_channel(&self, channel: &Channel) -> Vec<ChannelGroup> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .filter(|(group, members)| {
                group.is_radio == channel.is_radio && members.contains(&channel.channel_id)
            })
            .map(|(group, _)| group.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct MockStore {
    pub channel_writes: Mutex<Vec<(u32, DateTime<Utc>)>>,
    pub group_writes: Mutex<Vec<(u32, DateTime<Utc>)>>,
}

impl LastWatchedStore for MockStore {
    fn set_channel_last_watched(&self, channel: &Channel, when: DateTime<Utc>) -> Result<()> {
        self.channel_writes
            .lock()
            .unwrap()
            .push((channel.channel_id, when));
        Ok(())
    }

    fn set_group_last_watched(&self, group: &ChannelGroup, when: DateTime<Utc>) -> Result<()> {
        self.group_writes
            .lock()
            .unwrap()
            .push((group.group_id, when));
        Ok(())
    }
}

pub struct MockParental {
    pub result: Mutex<ParentalCheckResult>,
    pub calls: AtomicUsize,
}

impl Default for MockParental {
    fn default() -> Self {
        Self {
            result: Mutex::new(ParentalCheckResult::Ok),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ParentalGuard for MockParental {
    fn verify(&self, _channel: &Channel) -> ParentalCheckResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.result.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MockNotifications {
    pub messages: Mutex<Vec<(Severity, String)>>,
}

impl MockNotifications {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }
}

impl NotificationSink for MockNotifications {
    fn notify(&self, severity: Severity, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

#[derive(Default)]
pub struct MockReminderPrompt {
    pub choice: Mutex<Option<ReminderChoice>>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub last: Mutex<Option<ReminderAnnouncement>>,
}

impl ReminderPrompt for MockReminderPrompt {
    fn open(&self, announcement: &ReminderAnnouncement) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(announcement.clone());
    }

    fn poll_choice(&self) -> Option<ReminderChoice> {
        *self.choice.lock().unwrap()
    }

    fn update_progress(&self, _percent: u32) {}

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockInstantPrompt {
    /// `None` simulates a canceled dialog; otherwise the preselection is
    /// accepted unless `forced_choice` overrides it.
    pub cancel: Mutex<bool>,
    pub forced_choice: Mutex<Option<usize>>,
    pub seen: Mutex<Option<(Vec<InstantRecordOption>, usize)>>,
}

impl InstantRecordPrompt for MockInstantPrompt {
    fn select(&self, options: &[InstantRecordOption], preselect: usize) -> Option<usize> {
        *self.seen.lock().unwrap() = Some((options.to_vec(), preselect));
        if *self.cancel.lock().unwrap() {
            return None;
        }
        Some(self.forced_choice.lock().unwrap().unwrap_or(preselect))
    }
}

#[derive(Default)]
pub struct MockSwitcher {
    pub switched: Mutex<Vec<Channel>>,
}

impl ChannelSwitcher for MockSwitcher {
    fn switch_to(&self, channel: &Channel) -> Result<()> {
        self.switched.lock().unwrap().push(channel.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockClock {
    pub start: Mutex<Option<DateTime<Utc>>>,
    pub elapsed: Mutex<StdDuration>,
}

impl PlaybackClock for MockClock {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        *self.start.lock().unwrap()
    }

    fn elapsed(&self) -> StdDuration {
        *self.elapsed.lock().unwrap()
    }
}

// ---------------------------------------------------------------- fixtures

pub const ADDON: &str = "pvr.backend.test";

pub fn channel_on(client_id: ClientId, channel_id: u32, name: &str) -> Channel {
    Channel {
        channel_id,
        client_id,
        name: name.to_string(),
        is_radio: false,
        locked: false,
    }
}

pub fn epg_tag(channel: &Channel, event_id: u32, title: &str, start_offset_minutes: i64) -> EpgTag {
    let start = Utc::now() + Duration::minutes(start_offset_minutes);
    EpgTag {
        event_id,
        channel: channel.clone(),
        title: title.to_string(),
        start,
        end: start + Duration::minutes(60),
        recordable: true,
        gap: false,
    }
}

/// Everything a timer-engine test needs, wired the way a host would do it.
pub struct Harness {
    pub registry: Arc<ClientRegistry>,
    pub playback: Arc<PlaybackTracker>,
    pub engine: TimerEngine,
    pub client: Arc<MockClient>,
    pub client_id: ClientId,
    pub epg: Arc<MockEpg>,
    pub groups: Arc<MockGroups>,
    pub store: Arc<MockStore>,
    pub clock: Arc<MockClock>,
    pub parental: Arc<MockParental>,
    pub notifications: Arc<MockNotifications>,
    pub reminder_prompt: Arc<MockReminderPrompt>,
    pub instant_prompt: Arc<MockInstantPrompt>,
    pub switcher: Arc<MockSwitcher>,
    pub config: Arc<Config>,
    pub events: CoreEventBus,
    _config_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();

        let config_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::load(config_dir.path().to_str().unwrap()).unwrap());
        // Instant writes keep most tests free of sleeps; the deferred path
        // has dedicated tests that raise the delay again.
        config.set_last_watched_delay(0).unwrap();

        let events = CoreEventBus::new();
        let notifications = Arc::new(MockNotifications::default());

        let client_id = ClientId::from_addon_id(ADDON);
        let client = Arc::new(MockClient::new(client_id, ADDON));
        let factory =
            Arc::new(MockFactory::default().with_client(ADDON, Arc::clone(&client)));
        let registry = Arc::new(ClientRegistry::new(
            factory,
            notifications.clone() as Arc<dyn NotificationSink>,
            events.clone(),
        ));
        registry.register_or_update(&pvrcontrol::AddonEvent::enabled(ADDON));

        let epg = Arc::new(MockEpg::default());
        let groups = Arc::new(MockGroups::default());
        let store = Arc::new(MockStore::default());
        let clock = Arc::new(MockClock::default());
        let parental = Arc::new(MockParental::default());
        let reminder_prompt = Arc::new(MockReminderPrompt::default());
        let instant_prompt = Arc::new(MockInstantPrompt::default());
        let switcher = Arc::new(MockSwitcher::default());

        let playback = Arc::new(PlaybackTracker::new(
            groups.clone() as Arc<dyn GroupProvider>,
            store.clone() as Arc<dyn LastWatchedStore>,
            clock.clone() as Arc<dyn PlaybackClock>,
            Arc::clone(&config),
            events.clone(),
        ));

        let engine = TimerEngine::new(
            Arc::clone(&registry),
            Arc::clone(&playback),
            Services {
                epg: epg.clone() as Arc<dyn EpgProvider>,
                parental: parental.clone() as Arc<dyn ParentalGuard>,
                notifications: notifications.clone() as Arc<dyn NotificationSink>,
                reminder_prompt: reminder_prompt.clone() as Arc<dyn ReminderPrompt>,
                instant_prompt: instant_prompt.clone() as Arc<dyn InstantRecordPrompt>,
                switcher: switcher.clone() as Arc<dyn ChannelSwitcher>,
            },
            Arc::clone(&config),
            events.clone(),
        );

        Self {
            registry,
            playback,
            engine,
            client,
            client_id,
            epg,
            groups,
            store,
            clock,
            parental,
            notifications,
            reminder_prompt,
            instant_prompt,
            switcher,
            config,
            events,
            _config_dir: config_dir,
        }
    }

    pub fn channel(&self, channel_id: u32, name: &str) -> Channel {
        channel_on(self.client_id, channel_id, name)
    }
}
