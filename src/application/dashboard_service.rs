// Dashboard service - Runtime that owns the session and the broker connection
//
// One task owns every piece of mutable state. User commands, transport
// events and timer ticks arrive on channels and are handled one at a time.
use super::controller::{ConnectionController, ControlEffect, ControlError};
use super::render::{RenderSink, RenderUpdate};
use super::scheduler::{PeriodicTasks, TaskKind, Tick};
use super::session::Session;
use super::settings::{ConnectionSettings, SettingsService};
use super::synthetic::SyntheticFeed;
use super::transport::{
    EventSender, HandleId, Transport, TransportClient, TransportEnvelope, TransportEvent,
};
use crate::domain::channel::{
    ChannelId, TopicRegistry, REFRESH_COMMAND_PAYLOAD, REFRESH_COMMAND_TOPIC,
};
use crate::domain::dashboard::Dashboard;
use crate::domain::message_log::LogEntry;
use crate::domain::telemetry::ChartExport;
use bytes::Bytes;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, ControlError>>;

pub enum Command {
    Connect {
        settings: ConnectionSettings,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Refresh {
        reply: Reply<()>,
    },
    SendTestData {
        reply: Reply<()>,
    },
    SetPaused {
        paused: Option<bool>,
        reply: Reply<bool>,
    },
    ClearMessages {
        reply: Reply<()>,
    },
    ClearCharts {
        reply: Reply<()>,
    },
    ExportCharts {
        reply: Reply<ChartExport>,
    },
    ImportCharts {
        export: ChartExport,
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<Dashboard>,
    },
    Logout {
        reply: Reply<()>,
    },
    SetAutoRefresh {
        interval: Duration,
        reply: Reply<()>,
    },
}

/// Cheap, cloneable front door to the runtime
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
}

impl DashboardHandle {
    pub async fn connect(&self, settings: ConnectionSettings) -> Result<(), ControlError> {
        self.request(|reply| Command::Connect { settings, reply })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn refresh(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    pub async fn send_test_data(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::SendTestData { reply }).await
    }

    /// Returns whether the monitor is paused afterwards
    pub async fn pause(&self) -> Result<bool, ControlError> {
        self.set_paused(Some(true)).await
    }

    pub async fn resume(&self) -> Result<bool, ControlError> {
        self.set_paused(Some(false)).await
    }

    pub async fn toggle_pause(&self) -> Result<bool, ControlError> {
        self.set_paused(None).await
    }

    pub async fn clear_messages(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::ClearMessages { reply }).await
    }

    pub async fn clear_charts(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::ClearCharts { reply }).await
    }

    pub async fn export_charts(&self) -> Result<ChartExport, ControlError> {
        self.request(|reply| Command::ExportCharts { reply }).await
    }

    pub async fn import_charts(&self, export: ChartExport) -> Result<(), ControlError> {
        self.request(|reply| Command::ImportCharts { export, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<Dashboard, ControlError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn logout(&self) -> Result<(), ControlError> {
        self.request(|reply| Command::Logout { reply }).await
    }

    pub async fn set_auto_refresh(&self, interval: Duration) -> Result<(), ControlError> {
        self.request(|reply| Command::SetAutoRefresh { interval, reply })
            .await
    }

    async fn set_paused(&self, paused: Option<bool>) -> Result<bool, ControlError> {
        self.request(|reply| Command::SetPaused { paused, reply })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ControlError::Stopped)?;
        rx.await.map_err(|_| ControlError::Stopped)?
    }
}

pub struct DashboardService {
    session: Session,
    controller: ConnectionController,
    tasks: PeriodicTasks,
    feed: SyntheticFeed,
    transport: Arc<dyn Transport>,
    client: Option<(HandleId, Box<dyn TransportClient>)>,
    settings: SettingsService,
    sink: Arc<dyn RenderSink>,
    events_tx: EventSender,
    events: mpsc::Receiver<TransportEnvelope>,
    ticks: mpsc::Receiver<Tick>,
    commands: mpsc::Receiver<Command>,
}

impl DashboardService {
    pub fn new(
        registry: TopicRegistry,
        transport: Arc<dyn Transport>,
        settings: SettingsService,
        sink: Arc<dyn RenderSink>,
        auto_refresh_interval: Duration,
    ) -> (Self, DashboardHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (ticks_tx, ticks) = mpsc::channel(COMMAND_BUFFER);

        let topics = registry.topics().map(str::to_string).collect();
        let service = Self {
            session: Session::new(registry),
            controller: ConnectionController::new(topics),
            tasks: PeriodicTasks::new(ticks_tx, auto_refresh_interval),
            feed: SyntheticFeed::new(),
            transport,
            client: None,
            settings,
            sink,
            events_tx,
            events,
            ticks,
            commands,
        };
        (
            service,
            DashboardHandle {
                commands: commands_tx,
            },
        )
    }

    pub fn with_feed(mut self, feed: SyntheticFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every handle has been dropped
    pub async fn run(mut self) {
        tracing::info!("Dashboard runtime started");
        loop {
            // Inbound telemetry is drained before user commands are looked at
            tokio::select! {
                biased;
                Some(envelope) = self.events.recv() => self.on_transport(envelope).await,
                Some(tick) = self.ticks.recv() => self.on_tick(tick).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }
        }

        self.tasks.cancel_all();
        if let Some((handle, mut client)) = self.client.take() {
            if let Err(e) = client.end().await {
                tracing::warn!("Failed to close connection {}: {:#}", handle, e);
            }
        }
        tracing::info!("Dashboard runtime stopped");
    }

    async fn on_command(&mut self, command: Command) {
        let now = Utc::now();
        match command {
            Command::Connect { settings, reply } => {
                let result = match self.controller.connect(&settings) {
                    Ok(effects) => {
                        self.apply_effects(effects).await;
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("Rejected connection settings: {}", e);
                        Err(ControlError::from(e))
                    }
                };
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                let effects = self.controller.disconnect(now);
                self.apply_effects(effects).await;
                let _ = reply.send(Ok(()));
            }
            Command::Refresh { reply } => {
                let result = self.refresh().await;
                let _ = reply.send(result);
            }
            Command::SendTestData { reply } => {
                let result = self.publish_full_reading().await;
                let _ = reply.send(result);
            }
            Command::SetPaused { paused, reply } => {
                let updates = match paused {
                    Some(true) => self.session.pause(now),
                    Some(false) => self.session.resume(now),
                    None => self.session.toggle_pause(now),
                };
                self.render(updates);
                let _ = reply.send(Ok(self.session.is_paused()));
            }
            Command::ClearMessages { reply } => {
                let updates = self.session.clear_messages();
                self.render(updates);
                let _ = reply.send(Ok(()));
            }
            Command::ClearCharts { reply } => {
                let updates = self.session.clear_charts(now);
                self.render(updates);
                let _ = reply.send(Ok(()));
            }
            Command::ExportCharts { reply } => {
                let (export, updates) = self.session.export_charts(now);
                self.render(updates);
                let _ = reply.send(Ok(export));
            }
            Command::ImportCharts { export, reply } => {
                let result = match self.session.import_charts(&export, now) {
                    Ok(updates) => {
                        self.render(updates);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("Rejected chart import: {}", e);
                        Err(ControlError::from(e))
                    }
                };
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.session.snapshot()));
            }
            Command::Logout { reply } => {
                let effects = self.controller.reset();
                self.apply_effects(effects).await;
                let updates = self.session.reset(now);
                self.render(updates);
                tracing::info!("Session reset");
                let _ = reply.send(Ok(()));
            }
            Command::SetAutoRefresh { interval, reply } => {
                tracing::info!("Auto-refresh interval set to {:?}", interval);
                self.tasks.set_auto_refresh_interval(interval);
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn on_transport(&mut self, envelope: TransportEnvelope) {
        let TransportEnvelope { handle, event } = envelope;
        let now = Utc::now();

        if let TransportEvent::Message { topic, payload } = &event {
            if self.controller.active_handle() != Some(handle) {
                tracing::debug!("Dropping message from stale connection {}", handle);
                return;
            }
            let updates = self.session.ingest(topic, payload, now);
            self.render(updates);
            return;
        }

        let is_active = self.controller.active_handle() == Some(handle);
        let effects = self.controller.handle(handle, &event, now);
        if is_active && event == TransportEvent::Ended {
            // The transport is gone on its own; nothing left to end
            self.client = None;
        }
        self.apply_effects(effects).await;
    }

    async fn on_tick(&mut self, tick: Tick) {
        if !self.tasks.is_current(&tick) {
            tracing::debug!("Discarding stale {:?}", tick);
            return;
        }
        if !self.controller.is_connected() {
            return;
        }

        let result = match tick.kind {
            TaskKind::AutoRefresh => {
                let value = self.feed.room_temperature();
                match self.session.registry().topic_of(ChannelId::TempRoom) {
                    Some(topic) => self.publish(topic, value).await,
                    None => Ok(()),
                }
            }
            TaskKind::SyntheticFeed => self.publish_full_reading().await,
        };
        if let Err(e) = result {
            tracing::warn!("Periodic {:?} publish failed: {}", tick.kind, e);
        }
    }

    async fn refresh(&mut self) -> Result<(), ControlError> {
        self.publish(REFRESH_COMMAND_TOPIC, REFRESH_COMMAND_PAYLOAD.to_string())
            .await?;
        let updates = self.session.refresh(Utc::now());
        self.render(updates);
        Ok(())
    }

    async fn publish_full_reading(&mut self) -> Result<(), ControlError> {
        let reading = self.feed.full_reading(Utc::now());
        for (channel, value) in reading {
            let Some(topic) = self.session.registry().topic_of(channel) else {
                continue;
            };
            self.publish(topic, value).await?;
        }
        tracing::debug!("Published synthetic reading");
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: String) -> Result<(), ControlError> {
        if !self.controller.is_connected() {
            return Err(ControlError::NotConnected);
        }
        let Some((_, client)) = self.client.as_mut() else {
            return Err(ControlError::NotConnected);
        };
        client
            .publish(topic, Bytes::from(payload))
            .await
            .map_err(|e| ControlError::Transport(format!("{:#}", e)))
    }

    async fn apply_effects(&mut self, effects: Vec<ControlEffect>) {
        let mut queue: VecDeque<ControlEffect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            let now = Utc::now();
            match effect {
                ControlEffect::Teardown(handle) => self.teardown(handle).await,
                ControlEffect::Open { handle, endpoint } => {
                    match self
                        .transport
                        .connect(handle, &endpoint, self.events_tx.clone())
                        .await
                    {
                        Ok(client) => self.client = Some((handle, client)),
                        Err(e) => {
                            tracing::error!("Failed to open connection to {}: {:#}", endpoint, e);
                            let failed = TransportEvent::Error(format!("{:#}", e));
                            queue.extend(self.controller.handle(handle, &failed, now));
                            queue.extend(self.controller.handle(handle, &TransportEvent::Ended, now));
                        }
                    }
                }
                ControlEffect::Status(status) => {
                    let updates = self.session.set_connection(status);
                    self.render(updates);
                }
                ControlEffect::Log(entry) => {
                    let updates = self.session.note(entry);
                    self.render(updates);
                }
                ControlEffect::ClearSubscriptions => {
                    let updates = self.session.clear_subscriptions();
                    self.render(updates);
                }
                ControlEffect::Subscribe { handle, topic } => self.subscribe(handle, &topic).await,
                ControlEffect::PersistSettings(settings) => {
                    if let Err(e) = self.settings.save_connection(&settings) {
                        tracing::warn!("Failed to save connection settings: {:#}", e);
                        let updates = self
                            .session
                            .note(LogEntry::error(now, "Could not save connection settings"));
                        self.render(updates);
                    }
                }
                ControlEffect::StartTasks => self.tasks.start(),
                ControlEffect::CancelTasks => self.tasks.cancel_all(),
            }
        }
    }

    async fn teardown(&mut self, handle: HandleId) {
        match self.client.take() {
            Some((current, mut client)) if current == handle => {
                if let Err(e) = client.end().await {
                    tracing::warn!("Failed to close connection {}: {:#}", handle, e);
                }
            }
            other => self.client = other,
        }
    }

    async fn subscribe(&mut self, handle: HandleId, topic: &str) {
        let Some((current, client)) = self.client.as_mut() else {
            return;
        };
        if *current != handle {
            return;
        }
        match client.subscribe(topic).await {
            Ok(()) => {
                tracing::debug!("Subscribed to {}", topic);
                let updates = self.session.mark_subscribed(topic);
                self.render(updates);
            }
            Err(e) => tracing::warn!("Subscription to {} failed: {:#}", topic, e),
        }
    }

    fn render(&self, updates: Vec<RenderUpdate>) {
        for update in &updates {
            update.apply_to(self.sink.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::testing::RecordingSink;
    use crate::application::settings::testing::memory_service;
    use crate::application::transport::testing::{Call, FakeTransport};
    use crate::domain::connection::ConnectionState;
    use crate::domain::message_log::EntryKind;

    struct Harness {
        handle: DashboardHandle,
        transport: FakeTransport,
        sink: Arc<RecordingSink>,
        settings: SettingsService,
    }

    fn harness(auto_refresh: Duration) -> Harness {
        let transport = FakeTransport::default();
        let sink = Arc::new(RecordingSink::default());
        let settings = memory_service(ConnectionSettings::default());
        let (service, handle) = DashboardService::new(
            TopicRegistry::standard(),
            Arc::new(transport.clone()),
            settings.clone(),
            sink.clone(),
            auto_refresh,
        );
        service.with_feed(SyntheticFeed::seeded(9)).spawn();
        Harness {
            handle,
            transport,
            sink,
            settings,
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            broker: "wss://broker.example.com:8884/mqtt".to_string(),
            user: "pump".to_string(),
            pass: "secret".to_string(),
            ..ConnectionSettings::default()
        }
    }

    async fn emit(h: &Harness, handle: HandleId, event: TransportEvent) {
        h.transport
            .sender(handle)
            .unwrap()
            .send(TransportEnvelope { handle, event })
            .await
            .unwrap();
    }

    async fn message(h: &Harness, handle: HandleId, topic: &str, payload: &str) {
        emit(
            h,
            handle,
            TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.to_string(),
            },
        )
        .await;
    }

    async fn connected(h: &Harness) {
        h.handle.connect(settings()).await.unwrap();
        emit(h, HandleId(1), TransportEvent::Connected).await;
        h.handle.snapshot().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_persists() {
        let h = harness(Duration::ZERO);
        connected(&h).await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection.state, ConnectionState::Connected);
        assert_eq!(snapshot.topic_count(), 12);
        assert_eq!(h.settings.load_connection(), settings());

        let subscribed = h
            .transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Subscribe { .. }))
            .count();
        assert_eq!(subscribed, 12);
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let h = harness(Duration::ZERO);
        let bad = ConnectionSettings {
            broker: "http://nope".to_string(),
            ..settings()
        };

        let result = h.handle.connect(bad).await;
        assert!(matches!(result, Err(ControlError::Config(_))));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_connect_leaves_one_live_connection() {
        let h = harness(Duration::ZERO);
        h.handle.connect(settings()).await.unwrap();
        h.handle.connect(settings()).await.unwrap();

        assert_eq!(h.transport.live_handles(), vec![HandleId(2)]);
    }

    #[tokio::test]
    async fn test_messages_flow_into_session_and_sink() {
        let h = harness(Duration::ZERO);
        connected(&h).await;
        h.sink.take();

        message(&h, HandleId(1), "m5stick/internal/temp_room", "21.5").await;
        let snapshot = h.handle.snapshot().await.unwrap();

        assert_eq!(snapshot.message_count, 1);
        let room = snapshot
            .tiles
            .iter()
            .find(|t| t.id == ChannelId::TempRoom)
            .unwrap();
        assert_eq!(room.value, "21.5");
        assert!(h
            .sink
            .take()
            .iter()
            .any(|u| matches!(u, RenderUpdate::Chart { .. })));
    }

    #[tokio::test]
    async fn test_stale_connection_messages_are_dropped() {
        let h = harness(Duration::ZERO);
        h.handle.connect(settings()).await.unwrap();
        let stale = h.transport.sender(HandleId(1)).unwrap();
        h.handle.connect(settings()).await.unwrap();

        stale
            .send(TransportEnvelope {
                handle: HandleId(1),
                event: TransportEvent::Message {
                    topic: "m5stick/internal/temp_room".to_string(),
                    payload: "30".to_string(),
                },
            })
            .await
            .unwrap();

        assert_eq!(h.handle.snapshot().await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_refresh_requires_connection() {
        let h = harness(Duration::ZERO);
        assert!(matches!(
            h.handle.refresh().await,
            Err(ControlError::NotConnected)
        ));

        connected(&h).await;
        h.handle.refresh().await.unwrap();
        assert_eq!(
            h.transport.published(),
            vec![(REFRESH_COMMAND_TOPIC.to_string(), "1".to_string())]
        );
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.messages[0].kind, EntryKind::Command);
    }

    #[tokio::test]
    async fn test_send_test_data_publishes_every_topic() {
        let h = harness(Duration::ZERO);
        connected(&h).await;
        h.handle.send_test_data().await.unwrap();

        assert_eq!(h.transport.published().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_feed_runs_while_connected() {
        let h = harness(Duration::ZERO);
        connected(&h).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        h.handle.snapshot().await.unwrap();
        assert_eq!(h.transport.published().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_periodic_publishing() {
        let h = harness(Duration::from_secs(2));
        connected(&h).await;

        emit(&h, HandleId(1), TransportEvent::Closed).await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection.state, ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(20)).await;
        h.handle.snapshot().await.unwrap();
        assert!(h.transport.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_publishes_room_temperature() {
        let h = harness(Duration::from_secs(2));
        connected(&h).await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        h.handle.snapshot().await.unwrap();
        let published = h.transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "m5stick/internal/temp_room");
    }

    #[tokio::test]
    async fn test_failed_open_reports_error_and_releases() {
        let h = harness(Duration::ZERO);
        *h.transport.fail_connect.lock().unwrap() = true;

        h.handle.connect(settings()).await.unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();

        assert_eq!(snapshot.connection.state, ConnectionState::Erroring);
        assert_eq!(snapshot.messages[0].kind, EntryKind::Error);
        assert!(matches!(
            h.handle.refresh().await,
            Err(ControlError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_while_connected_ends_old_transport_once() {
        let h = harness(Duration::ZERO);
        connected(&h).await;
        h.handle.connect(settings()).await.unwrap();

        let ended = h
            .transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::End { handle } if *handle == HandleId(1)))
            .count();
        assert_eq!(ended, 1);
        assert_eq!(h.transport.live_handles(), vec![HandleId(2)]);
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting_shows_disconnected() {
        let h = harness(Duration::ZERO);
        h.handle.connect(settings()).await.unwrap();

        h.handle.disconnect().await.unwrap();
        assert!(h.transport.live_handles().is_empty());
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_manual_disconnect_ends_transport() {
        let h = harness(Duration::ZERO);
        connected(&h).await;

        h.handle.disconnect().await.unwrap();
        assert!(h.transport.live_handles().is_empty());
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.messages[0].value, "Disconnected manually");
    }

    #[tokio::test]
    async fn test_pause_and_logout() {
        let h = harness(Duration::ZERO);
        connected(&h).await;

        assert!(h.handle.pause().await.unwrap());
        message(&h, HandleId(1), "m5stick/external/fan", "900").await;
        assert_eq!(h.handle.snapshot().await.unwrap().message_count, 0);
        assert!(!h.handle.toggle_pause().await.unwrap());

        message(&h, HandleId(1), "m5stick/external/fan", "900").await;
        h.handle.logout().await.unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.message_count, 0);
        assert_eq!(snapshot.topic_count(), 0);
        assert!(h.transport.live_handles().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscription_is_not_counted() {
        let h = harness(Duration::ZERO);
        h.transport
            .failing_topics
            .lock()
            .unwrap()
            .push("m5stick/internal/mode".to_string());
        connected(&h).await;

        assert_eq!(h.handle.snapshot().await.unwrap().topic_count(), 11);
    }
}
