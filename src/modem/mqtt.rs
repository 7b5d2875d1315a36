//! Configuration and use of the MQTT client in the modem firmware.

use embedded_hal::delay::DelayNs;
use serde::Serialize;

use super::Modem;
use crate::command::Operation;
use crate::error::Error;
use crate::session::{Console, Event};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// `+UMQTT=2,<server>,<port>`
#[derive(Serialize)]
struct Broker<'a> {
    host: &'a str,
    port: u16,
}

/// `+UMQTT=4,<username>,<password>`
#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// `+UMQTTC=2,<QoS>,<retain>,<topic>,<message>`
#[derive(Serialize)]
struct Publish<'a> {
    qos: u8,
    retain: u8,
    topic: &'a str,
    message: &'a str,
}

/// `+UMQTTC=4,<max_QoS>,<topic_filter>`
#[derive(Serialize)]
struct Subscribe<'a> {
    qos: u8,
    topic: &'a str,
}

impl<T, D, C> Modem<T, D, C>
where
    T: Transport,
    D: DelayNs,
    C: Console,
{
    pub fn set_client_id(&mut self, client_id: &str) -> Result<(), Error> {
        self.transact(Operation::SetClientId, &client_id)
            .map(|_| ())
    }

    /// Broker host name or address and TCP port.
    pub fn set_broker(&mut self, host: &str, port: u16) -> Result<(), Error> {
        self.transact(Operation::SetBroker, &Broker { host, port })
            .map(|_| ())
    }

    pub fn set_credentials(&mut self, username: &str, password: &str) -> Result<(), Error> {
        let args = Credentials { username, password };
        self.transact(Operation::SetCredentials, &args)
            .map(|_| ())
    }

    /// Last will topic, always registered with QoS 0 and without retain.
    pub fn set_will_topic(&mut self, topic: &str) -> Result<(), Error> {
        self.transact(Operation::SetWillTopic, &topic)
            .map(|_| ())
    }

    pub fn set_will_message(&mut self, message: &str) -> Result<(), Error> {
        self.transact(Operation::SetWillMessage, &message)
            .map(|_| ())
    }

    /// Inactivity timeout in seconds after which the client pings the broker.
    pub fn set_keepalive_interval(&mut self, seconds: u16) -> Result<(), Error> {
        self.transact(Operation::SetKeepaliveInterval, &seconds)
            .map(|_| ())
    }

    pub fn enable_keepalive(&mut self) -> Result<(), Error> {
        self.simple(Operation::EnableKeepalive)
    }

    /// Connect to the broker. Can take long on a fresh network attach.
    pub fn login(&mut self) -> Result<(), Error> {
        self.simple(Operation::Login)?;
        info!("MQTT session established");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), Error> {
        self.simple(Operation::Logout)
    }

    pub fn publish(
        &mut self,
        topic: &str,
        message: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let args = Publish {
            qos: qos as u8,
            retain: u8::from(retain),
            topic,
            message,
        };
        self.transact(Operation::Publish, &args)?;
        debug!("Published {} bytes to {:?}", message.len(), topic);
        self.console.event(Event::Published);
        Ok(())
    }

    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        let args = Subscribe {
            qos: qos as u8,
            topic,
        };
        self.transact(Operation::Subscribe, &args).map(|_| ())
    }
}
