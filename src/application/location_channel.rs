// Location channel - Reconnecting publish/subscribe client for vehicle positions
use crate::application::simulator::RandomWalk;
use crate::application::subscribers::{self, LocationCallback, SubscriberId, SubscriberList};
use crate::application::transport::{LinkCommand, Transport, TransportEvent, TransportLink};
use crate::domain::connection::ConnectionState;
use crate::domain::events::{InboundEvent, OutboundEvent};
use crate::domain::location::Location;
use crate::infrastructure::config::{ReconnectSettings, SimulationSettings};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub reconnect: ReconnectSettings,
    pub simulation: SimulationSettings,
}

/// Shared handle to the process-wide location channel. Cloning is cheap and
/// every clone observes the same connection.
#[derive(Clone)]
pub struct LocationChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    transport: Arc<dyn Transport>,
    settings: ChannelSettings,
    state: Mutex<ChannelState>,
}

struct ChannelState {
    connection: ConnectionState,
    current_location: Option<Location>,
    subscribers: SubscriberList,
    reconnect_attempts: u32,
    session: Option<Session>,
    next_session: u64,
}

/// One `connect` call's worth of resources.
struct Session {
    id: u64,
    endpoint: String,
    commands: mpsc::UnboundedSender<LinkCommand>,
    exhausted: bool,
    pump: JoinHandle<()>,
    fallback: Option<JoinHandle<()>>,
    simulator: Option<JoinHandle<()>>,
}

impl Session {
    fn cancel_simulation(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            fallback.abort();
        }
        if let Some(simulator) = self.simulator.take() {
            simulator.abort();
        }
    }

    fn close(mut self) {
        self.cancel_simulation();
        let _ = self.commands.send(LinkCommand::Close);
        self.pump.abort();
    }
}

/// Removes its callback from the channel when `unsubscribe` is called.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.channel.upgrade() {
            if inner.lock_state().subscribers.remove(self.id) {
                tracing::debug!(subscriber = ?self.id, "location subscriber removed");
            }
        }
    }
}

impl LocationChannel {
    pub fn new(transport: Arc<dyn Transport>, settings: ChannelSettings) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                settings,
                state: Mutex::new(ChannelState {
                    connection: ConnectionState::Disconnected,
                    current_location: None,
                    subscribers: SubscriberList::new(),
                    reconnect_attempts: 0,
                    session: None,
                    next_session: 0,
                }),
            }),
        }
    }

    /// Start connecting to `endpoint` without waiting for the outcome.
    ///
    /// Ignored while a previous connection is live or still retrying. With
    /// `enable_simulation`, the channel switches to simulated locations if no
    /// real connection is up once the grace period has passed.
    pub fn connect(&self, endpoint: &str, enable_simulation: bool) {
        let mut guard = self.inner.lock_state();
        let state = &mut *guard;

        if state.connection.is_live() {
            tracing::debug!(state = %state.connection, "connect ignored, channel already live");
            return;
        }
        if let Some(session) = &state.session {
            if !session.exhausted || state.connection != ConnectionState::Disconnected {
                tracing::debug!(
                    endpoint = %session.endpoint,
                    state = %state.connection,
                    "connect ignored, channel already active"
                );
                return;
            }
        }
        if let Some(stale) = state.session.take() {
            tracing::debug!(endpoint = %stale.endpoint, "replacing exhausted transport");
            stale.close();
        }

        let id = state.next_session;
        state.next_session += 1;

        let TransportLink { commands, events } =
            self.inner.transport.open(endpoint, &self.inner.settings.reconnect);
        let pump = tokio::spawn(pump_events(Arc::downgrade(&self.inner), id, events));
        let fallback = enable_simulation.then(|| {
            tokio::spawn(arm_simulation(
                Arc::downgrade(&self.inner),
                id,
                self.inner.settings.simulation.clone(),
            ))
        });

        state.connection = ConnectionState::Connecting;
        state.session = Some(Session {
            id,
            endpoint: endpoint.to_string(),
            commands,
            exhausted: false,
            pump,
            fallback,
            simulator: None,
        });

        tracing::info!(endpoint, enable_simulation, "connecting to location server");
    }

    /// Register `callback` for every future sample. If a location is already
    /// cached the callback receives it before this returns.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Location) + Send + Sync + 'static,
    {
        let callback: LocationCallback = Arc::new(callback);
        let (id, cached) = {
            let mut state = self.inner.lock_state();
            (state.subscribers.add(callback.clone()), state.current_location.clone())
        };
        tracing::debug!(subscriber = ?id, replay = cached.is_some(), "location subscriber added");

        if let Some(location) = cached {
            subscribers::notify(id, &callback, &location);
        }

        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    pub fn send_location(&self, location: &Location) -> bool {
        if !location.is_valid() {
            tracing::warn!(?location, "refusing to send invalid location");
            return false;
        }
        self.inner.emit(OutboundEvent::UpdateLocation(location.clone()))
    }

    pub fn send_broadcast_status(&self, is_active: bool) -> bool {
        self.inner.emit(OutboundEvent::BroadcastStatus { is_active })
    }

    pub fn connection_status(&self) -> bool {
        self.connection_state().is_live()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock_state().connection
    }

    pub fn current_location(&self) -> Option<Location> {
        self.inner.lock_state().current_location.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock_state().reconnect_attempts
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }

    /// Tear everything down. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let session = {
            let mut state = self.inner.lock_state();
            state.connection = ConnectionState::Disconnected;
            state.current_location = None;
            state.subscribers.clear();
            state.reconnect_attempts = 0;
            state.session.take()
        };

        if let Some(session) = session {
            tracing::info!(endpoint = %session.endpoint, "disconnected from location server");
            session.close();
        }
    }
}

impl ChannelInner {
    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: OutboundEvent) -> bool {
        let state = self.lock_state();
        if state.connection != ConnectionState::Connected {
            tracing::debug!(
                event = event.name(),
                state = %state.connection,
                "not connected, event not sent"
            );
            return false;
        }
        let Some(session) = &state.session else {
            return false;
        };

        match session.commands.send(LinkCommand::Emit(event)) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("transport gone, event not sent");
                false
            }
        }
    }

    fn handle_event(&self, session_id: u64, event: TransportEvent) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
            return;
        };

        match event {
            TransportEvent::Connected => {
                if state.connection == ConnectionState::SimulatedConnected {
                    tracing::info!("location server reachable, leaving simulation");
                }
                session.cancel_simulation();
                session.exhausted = false;
                state.connection = ConnectionState::Connected;
                state.reconnect_attempts = 0;
                tracing::info!(endpoint = %session.endpoint, "connected to location server");
            }
            TransportEvent::ConnectError(reason) => {
                state.reconnect_attempts += 1;
                if state.connection != ConnectionState::SimulatedConnected {
                    state.connection = ConnectionState::Disconnected;
                }
                tracing::warn!(
                    attempts = state.reconnect_attempts,
                    "location server connection error: {}",
                    reason
                );
            }
            TransportEvent::Disconnected(reason) => {
                tracing::warn!(%reason, "location server disconnected");
                if state.connection == ConnectionState::Connected {
                    if reason.is_server_initiated() {
                        state.connection = ConnectionState::Connecting;
                        let _ = session.commands.send(LinkCommand::Connect);
                    } else {
                        state.connection = ConnectionState::Disconnected;
                    }
                }
            }
            TransportEvent::ReconnectAttempt(attempt) => {
                tracing::debug!(attempt, "reconnecting to location server");
            }
            TransportEvent::Reconnected(attempts) => {
                tracing::info!(attempts, "reconnected to location server");
            }
            TransportEvent::ReconnectFailed => {
                session.exhausted = true;
                tracing::warn!(endpoint = %session.endpoint, "giving up on location server");
            }
            TransportEvent::Inbound(InboundEvent::Location(location)) => {
                drop(guard);
                self.publish(session_id, location, ConnectionState::Connected);
            }
        }
    }

    /// Cache `location` and fan it out, provided the session is current and
    /// the channel is still in `expected` state. Returns false otherwise.
    fn publish(&self, session_id: u64, location: Location, expected: ConnectionState) -> bool {
        let targets = {
            let mut state = self.lock_state();
            let current = state.session.as_ref().is_some_and(|s| s.id == session_id);
            if !current || state.connection != expected {
                tracing::debug!(state = %state.connection, "dropping location sample");
                return false;
            }
            state.current_location = Some(location.clone());
            state.subscribers.snapshot()
        };

        for (id, callback) in targets {
            // a subscriber removed earlier in this fan-out must not hear about it
            if !self.lock_state().subscribers.contains(id) {
                continue;
            }
            subscribers::notify(id, &callback, &location);
        }
        true
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = state.session.take() {
            session.close();
        }
    }
}

async fn pump_events(
    inner: Weak<ChannelInner>,
    session_id: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(session_id, event);
    }
}

async fn arm_simulation(inner: Weak<ChannelInner>, session_id: u64, settings: SimulationSettings) {
    tokio::time::sleep(settings.grace_period()).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut guard = inner.lock_state();
    let state = &mut *guard;
    let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
        return;
    };
    session.fallback = None;
    if state.connection == ConnectionState::Connected {
        return;
    }

    tracing::info!(
        grace_ms = settings.grace_period_ms,
        "no location server connection, switching to simulated locations"
    );
    state.connection = ConnectionState::SimulatedConnected;
    session.simulator = Some(tokio::spawn(run_simulator(
        Arc::downgrade(&inner),
        session_id,
        settings,
    )));
}

async fn run_simulator(inner: Weak<ChannelInner>, session_id: u64, settings: SimulationSettings) {
    let mut walk = RandomWalk::new(&settings);
    let mut ticker = tokio::time::interval(settings.tick());

    loop {
        ticker.tick().await;
        let sample = walk.step(&mut rand::thread_rng());
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.publish(session_id, sample, ConnectionState::SimulatedConnected) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::LinkEnds;
    use crate::domain::connection::DisconnectReason;
    use chrono::Utc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeTransport {
        opened: Mutex<Vec<(String, LinkEnds)>>,
    }

    impl Transport for FakeTransport {
        fn open(&self, endpoint: &str, _policy: &ReconnectSettings) -> TransportLink {
            let (link, ends) = TransportLink::pair();
            self.opened.lock().unwrap().push((endpoint.to_string(), ends));
            link
        }
    }

    impl FakeTransport {
        fn opened(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn emit(&self, event: TransportEvent) {
            let opened = self.opened.lock().unwrap();
            let (_, ends) = opened.last().expect("no transport opened");
            assert!(ends.emit(event));
        }

        fn commands(&self) -> Vec<LinkCommand> {
            let mut opened = self.opened.lock().unwrap();
            let (_, ends) = opened.last_mut().expect("no transport opened");
            let mut commands = Vec::new();
            while let Ok(command) = ends.commands.try_recv() {
                commands.push(command);
            }
            commands
        }
    }

    fn setup() -> (Arc<FakeTransport>, LocationChannel) {
        let transport = Arc::new(FakeTransport::default());
        let channel = LocationChannel::new(transport.clone(), ChannelSettings::default());
        (transport, channel)
    }

    fn recorder(channel: &LocationChannel) -> (Arc<Mutex<Vec<Location>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription =
            channel.subscribe(move |location| sink.lock().unwrap().push(location.clone()));
        (seen, subscription)
    }

    fn fix(latitude: f64, longitude: f64) -> Location {
        Location::new(latitude, longitude, Utc::now()).unwrap()
    }

    fn inbound(latitude: f64, longitude: f64) -> TransportEvent {
        TransportEvent::Inbound(InboundEvent::Location(fix(latitude, longitude)))
    }

    /// Let spawned tasks drain their queues.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn connected() -> (Arc<FakeTransport>, LocationChannel) {
        let (transport, channel) = setup();
        channel.connect("wss://x", false);
        transport.emit(TransportEvent::Connected);
        settle().await;
        assert_eq!(channel.connection_state(), ConnectionState::Connected);
        (transport, channel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_without_cache_gets_nothing_synchronously() {
        let (transport, channel) = connected().await;
        let (seen, _sub) = recorder(&channel);
        assert!(seen.lock().unwrap().is_empty());

        transport.emit(inbound(25.7617, -80.1918));
        settle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].latitude, 25.7617);
        assert_eq!(channel.current_location().as_ref(), Some(&seen[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_replays_cached_location() {
        let (transport, channel) = connected().await;
        transport.emit(inbound(25.0, -80.0));
        transport.emit(inbound(25.5, -80.5));
        settle().await;

        let (seen, _sub) = recorder(&channel);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].latitude, seen[0].longitude), (25.5, -80.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_delivered_in_order() {
        let (transport, channel) = connected().await;
        let (seen, _sub) = recorder(&channel);

        for i in 0..10 {
            transport.emit(inbound(25.0 + i as f64 * 0.01, -80.0));
        }
        settle().await;

        let latitudes: Vec<f64> = seen.lock().unwrap().iter().map(|l| l.latitude).collect();
        let expected: Vec<f64> = (0..10).map(|i| 25.0 + i as f64 * 0.01).collect();
        assert_eq!(latitudes, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_location_requires_connection() {
        let (transport, channel) = setup();
        assert!(!channel.send_location(&fix(1.0, 2.0)));
        assert!(!channel.send_broadcast_status(true));

        channel.connect("wss://x", false);
        assert!(!channel.send_location(&fix(1.0, 2.0)));
        assert!(transport.commands().is_empty());

        transport.emit(TransportEvent::Connected);
        settle().await;

        let location = fix(25.8, -80.2).with_broadcasting(true);
        assert!(channel.send_location(&location));
        assert_eq!(
            transport.commands(),
            vec![LinkCommand::Emit(OutboundEvent::UpdateLocation(location))]
        );

        assert!(channel.send_broadcast_status(false));
        assert_eq!(
            transport.commands(),
            vec![LinkCommand::Emit(OutboundEvent::BroadcastStatus { is_active: false })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_location_rejects_invalid_fix() {
        let (transport, channel) = connected().await;
        let mut bad = fix(1.0, 2.0);
        bad.latitude = f64::NAN;

        assert!(!channel.send_location(&bad));
        assert!(transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_notifications() {
        let (transport, channel) = connected().await;
        let (kept, _keep) = recorder(&channel);
        let (dropped, subscription) = recorder(&channel);

        transport.emit(inbound(25.0, -80.0));
        settle().await;
        subscription.unsubscribe();
        subscription.unsubscribe();
        transport.emit(inbound(25.1, -80.1));
        settle().await;

        assert_eq!(kept.lock().unwrap().len(), 2);
        assert_eq!(dropped.lock().unwrap().len(), 1);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_during_fan_out() {
        let (transport, channel) = connected().await;
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let handle = later.clone();
        let _first = channel.subscribe(move |_| {
            if let Some(subscription) = handle.lock().unwrap().as_ref() {
                subscription.unsubscribe();
            }
        });
        let (seen, second) = recorder(&channel);
        *later.lock().unwrap() = Some(second);

        transport.emit(inbound(25.0, -80.0));
        settle().await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_subscriber_is_isolated() {
        let (transport, channel) = connected().await;
        let (before, _a) = recorder(&channel);
        let _bad = channel.subscribe(|_| panic!("subscriber failure"));
        let (after, _b) = recorder(&channel);

        transport.emit(inbound(25.0, -80.0));
        transport.emit(inbound(25.1, -80.1));
        settle().await;

        assert_eq!(before.lock().unwrap().len(), 2);
        assert_eq!(after.lock().unwrap().len(), 2);
        assert_eq!(channel.subscriber_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_fallback() {
        let (transport, channel) = setup();
        channel.connect("wss://unreachable", true);
        transport.emit(TransportEvent::ConnectError("connection refused".into()));
        settle().await;
        assert!(!channel.connection_status());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        settle().await;
        assert!(channel.connection_status());
        assert_eq!(channel.connection_state(), ConnectionState::SimulatedConnected);

        let (seen, _sub) = recorder(&channel);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        settle().await;

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        for sample in seen.iter() {
            assert!(sample.demo);
            assert!((sample.latitude - 25.8010).abs() <= 0.01 + 1e-9);
            assert!((sample.longitude + 80.1994).abs() <= 0.01 + 1e-9);
        }
        assert!(!channel.send_location(&fix(1.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_simulation_when_disabled() {
        let (transport, channel) = setup();
        channel.connect("wss://unreachable", false);
        transport.emit(TransportEvent::ConnectError("timeout".into()));
        let (seen, _sub) = recorder(&channel);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_simulation_once_connected() {
        let (transport, channel) = setup();
        channel.connect("wss://x", true);
        transport.emit(TransportEvent::Connected);
        let (seen, _sub) = recorder(&channel);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(channel.connection_state(), ConnectionState::Connected);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_is_ignored() {
        let (transport, channel) = setup();
        channel.connect("wss://x", true);
        channel.connect("wss://x", true);
        assert_eq!(transport.opened(), 1);

        transport.emit(TransportEvent::Connected);
        settle().await;
        channel.connect("wss://y", true);
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_retries_exhausted_opens_new_transport() {
        let (transport, channel) = setup();
        channel.connect("wss://x", false);
        transport.emit(TransportEvent::ConnectError("refused".into()));
        transport.emit(TransportEvent::ReconnectFailed);
        settle().await;

        channel.connect("wss://x", false);
        assert_eq!(transport.opened(), 2);
        assert_eq!(channel.connection_state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_simulating_keeps_simulation() {
        let (transport, channel) = setup();
        channel.connect("wss://x", true);
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(channel.connection_state(), ConnectionState::SimulatedConnected);

        transport.emit(TransportEvent::ConnectError("refused".into()));
        transport.emit(TransportEvent::ReconnectFailed);
        settle().await;

        let (seen, _sub) = recorder(&channel);
        seen.lock().unwrap().clear();
        channel.connect("wss://x", true);

        assert_eq!(transport.opened(), 1);
        assert_eq!(channel.connection_state(), ConnectionState::SimulatedConnected);
        assert!(channel.connection_status());

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(seen.lock().unwrap().iter().any(|l| l.demo));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_simulator() {
        let (transport, channel) = setup();
        channel.connect("wss://unreachable", true);
        tokio::time::sleep(Duration::from_millis(3001)).await;
        let (seen, _sub) = recorder(&channel);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        let before = seen.lock().unwrap().len();
        assert!(before > 0);

        channel.disconnect();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(seen.lock().unwrap().len(), before);
        assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
        assert!(channel.current_location().is_none());
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(transport.commands(), vec![LinkCommand::Close]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_grace_period_cancels_fallback() {
        let (_transport, channel) = setup();
        channel.connect("wss://unreachable", true);
        channel.disconnect();
        channel.disconnect();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_disconnect_are_ignored() {
        let (transport, channel) = connected().await;
        let (seen, _sub) = recorder(&channel);
        channel.disconnect();

        let opened = transport.opened.lock().unwrap();
        // the pump is gone, so the send may fail; either way nothing is delivered
        let _ = opened[0].1.emit(inbound(25.0, -80.0));
        drop(opened);
        settle().await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(channel.current_location().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_disconnect_reissues_connect() {
        let (transport, channel) = connected().await;
        transport.emit(TransportEvent::Disconnected(DisconnectReason::ServerInitiated));
        settle().await;

        assert_eq!(channel.connection_state(), ConnectionState::Connecting);
        assert_eq!(transport.commands(), vec![LinkCommand::Connect]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_loss_marks_disconnected() {
        let (transport, channel) = connected().await;
        transport.emit(TransportEvent::Disconnected(DisconnectReason::PingTimeout));
        settle().await;

        assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
        assert!(!channel.connection_status());
        assert!(transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_errors_count_attempts() {
        let (transport, channel) = setup();
        channel.connect("wss://x", false);
        transport.emit(TransportEvent::ConnectError("refused".into()));
        transport.emit(TransportEvent::ReconnectAttempt(1));
        transport.emit(TransportEvent::ConnectError("refused".into()));
        settle().await;
        assert_eq!(channel.reconnect_attempts(), 2);

        transport.emit(TransportEvent::Reconnected(2));
        transport.emit(TransportEvent::Connected);
        settle().await;
        assert_eq!(channel.reconnect_attempts(), 0);
        assert!(channel.connection_status());
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_connection_replaces_simulation() {
        let (transport, channel) = setup();
        channel.connect("wss://slow", true);
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(channel.connection_state(), ConnectionState::SimulatedConnected);

        transport.emit(TransportEvent::Connected);
        settle().await;
        assert_eq!(channel.connection_state(), ConnectionState::Connected);

        let (seen, _sub) = recorder(&channel);
        seen.lock().unwrap().clear();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(seen.lock().unwrap().iter().all(|l| !l.demo));

        transport.emit(inbound(25.7617, -80.1918));
        settle().await;
        assert_eq!(seen.lock().unwrap().last().map(|l| l.demo), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_ignored_while_simulating() {
        let (transport, channel) = setup();
        channel.connect("wss://slow", true);
        tokio::time::sleep(Duration::from_millis(3001)).await;

        transport.emit(inbound(10.0, 10.0));
        settle().await;

        let current = channel.current_location().unwrap();
        assert!(current.demo);
    }
}
