// MQTT transport - Broker connections over rumqttc
use crate::application::endpoint::BrokerEndpoint;
use crate::application::settings::BrokerProtocol;
use crate::application::transport::{
    EventSender, HandleId, Transport, TransportClient, TransportEnvelope, TransportEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing, Packet, QoS,
    TlsConfiguration,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const REQUEST_CAPACITY: usize = 50;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default)]
pub struct RumqttTransport;

impl RumqttTransport {
    pub fn new() -> Self {
        Self
    }
}

pub fn mqtt_options(endpoint: &BrokerEndpoint) -> MqttOptions {
    let options = &endpoint.options;

    // Websocket transports take the whole URL as the host
    let mut opts = if endpoint.protocol.is_websocket() {
        MqttOptions::new(&options.client_id, endpoint.url(), endpoint.port)
    } else {
        MqttOptions::new(&options.client_id, &endpoint.host, endpoint.port)
    };

    opts.set_keep_alive(options.keep_alive);
    opts.set_clean_session(options.clean_session);
    if let Some(username) = &options.username {
        opts.set_credentials(username, options.password.clone().unwrap_or_default());
    }

    let transport = match endpoint.protocol {
        BrokerProtocol::Ws => rumqttc::Transport::Ws,
        BrokerProtocol::Mqtt => rumqttc::Transport::Tcp,
        BrokerProtocol::Wss if options.accept_invalid_certs => {
            rumqttc::Transport::wss_with_config(unverified_tls())
        }
        BrokerProtocol::Wss => rumqttc::Transport::wss_with_default_config(),
        BrokerProtocol::Mqtts if options.accept_invalid_certs => {
            rumqttc::Transport::tls_with_config(unverified_tls())
        }
        BrokerProtocol::Mqtts => rumqttc::Transport::tls_with_default_config(),
    };
    opts.set_transport(transport);
    opts
}

/// TLS that accepts any server certificate. Handshake signatures are still
/// checked against the certificate presented.
fn unverified_tls() -> TlsConfiguration {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
        .with_no_client_auth();
    TlsConfiguration::Rustls(Arc::new(config))
}

#[derive(Debug)]
struct AcceptAnyCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[async_trait]
impl Transport for RumqttTransport {
    async fn connect(
        &self,
        handle: HandleId,
        endpoint: &BrokerEndpoint,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn TransportClient>> {
        if endpoint.options.accept_invalid_certs && endpoint.protocol.is_tls() {
            tracing::warn!("Certificate verification disabled for {}", endpoint);
        }
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(endpoint), REQUEST_CAPACITY);

        let mut network = NetworkOptions::new();
        network.set_connection_timeout(endpoint.options.connect_timeout.as_secs());
        eventloop.set_network_options(network);

        let (stop_tx, stop_rx) = oneshot::channel();
        let driver = EventDriver {
            handle,
            events,
            reconnect_period: endpoint.options.reconnect_period,
        };
        tokio::spawn(driver.run(eventloop, stop_rx));

        tracing::info!("Opened MQTT connection {} to {}", handle, endpoint);
        Ok(Box::new(RumqttClient {
            handle,
            client,
            stop: Some(stop_tx),
        }))
    }
}

/// Polls the event loop and turns rumqttc events into transport events
struct EventDriver {
    handle: HandleId,
    events: EventSender,
    reconnect_period: Duration,
}

impl EventDriver {
    async fn run(self, mut eventloop: EventLoop, mut stop: oneshot::Receiver<()>) {
        let mut connected = false;

        loop {
            let polled = tokio::select! {
                _ = &mut stop => break,
                polled = eventloop.poll() => polled,
            };

            let delivered = match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    tracing::info!("MQTT connection {} established", self.handle);
                    self.emit(TransportEvent::Connected).await
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    self.emit(TransportEvent::Message {
                        topic: publish.topic,
                        payload,
                    })
                    .await
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    connected = false;
                    self.emit(TransportEvent::Closed).await
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("MQTT connection {} error: {}", self.handle, e);
                    let mut delivered = self.emit(TransportEvent::Error(e.to_string())).await;
                    if connected {
                        connected = false;
                        delivered = delivered && self.emit(TransportEvent::Closed).await;
                    }
                    if !delivered {
                        break;
                    }

                    tokio::select! {
                        _ = &mut stop => break,
                        _ = tokio::time::sleep(self.reconnect_period) => {}
                    }
                    tracing::info!("MQTT connection {} reconnecting", self.handle);
                    self.emit(TransportEvent::Reconnecting).await
                }
            };

            if !delivered {
                tracing::debug!("Event receiver for {} is gone", self.handle);
                break;
            }
        }

        // Give a requested disconnect a moment to reach the broker
        let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
            while let Ok(event) = eventloop.poll().await {
                if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                    break;
                }
            }
        })
        .await;

        self.emit(TransportEvent::Ended).await;
        tracing::info!("MQTT connection {} ended", self.handle);
    }

    async fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .send(TransportEnvelope {
                handle: self.handle,
                event,
            })
            .await
            .is_ok()
    }
}

struct RumqttClient {
    handle: HandleId,
    client: AsyncClient,
    stop: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl TransportClient for RumqttClient {
    async fn subscribe(&mut self, topic: &str) -> anyhow::Result<()> {
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> anyhow::Result<()> {
        self.client
            .publish_bytes(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn end(&mut self) -> anyhow::Result<()> {
        tracing::info!("Ending MQTT connection {}", self.handle);
        let result = self.client.try_disconnect();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        result?;
        Ok(())
    }
}
