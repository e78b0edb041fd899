//! Pure routing of rumqttc events

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;

/// What the session task should do with one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK received
    ConnectionAcknowledged,
    /// Inbound PUBLISH, forwarded to the dispatcher
    MessageReceived { topic: String, payload: String },
    /// Broker closed the session
    Disconnected,
    SubscriptionConfirmed { packet_id: u16 },
    /// Keep-alive and acknowledgement traffic, logged at debug
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Maps raw rumqttc events onto [`EventRoute`]
pub struct EventRouter;

impl EventRouter {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}
