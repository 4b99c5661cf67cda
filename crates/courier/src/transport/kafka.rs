/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Kafka-backed [`LogClient`].
//!
//! Each bucket index is used as the Kafka partition number, so the topic must
//! have at least `channel_count` partitions.

use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::info;

use super::log::{DeliveryFuture, LogClient};
use super::TransportMessage;
use crate::config::LogTransportSettings;
use crate::error::TransportError;

pub struct KafkaLogClient {
    producer: FutureProducer,
    topic: String,
}

impl KafkaLogClient {
    /// Creates the shared producer. Called once at startup.
    pub fn new(settings: &LogTransportSettings) -> Result<Self, TransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", settings.message_timeout_ms.to_string())
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| TransportError::SendFailed {
                bucket: 0,
                message: format!("failed to create Kafka producer: {}", e),
            })?;

        info!(brokers = %settings.brokers, topic = %settings.topic, "Kafka log client created");

        Ok(Self {
            producer,
            topic: settings.topic.clone(),
        })
    }

    fn headers(message: &TransportMessage) -> OwnedHeaders {
        message
            .headers()
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key,
                    value: Some(value.as_bytes()),
                })
            })
    }
}

impl LogClient for KafkaLogClient {
    fn submit(
        &self,
        partition: usize,
        message: &TransportMessage,
    ) -> Result<DeliveryFuture, TransportError> {
        let partition_number = i32::try_from(partition).map_err(|_| TransportError::UnknownBucket {
            bucket: partition,
            channel_count: i32::MAX as usize,
        })?;

        let record = FutureRecord::to(&self.topic)
            .key(message.routing_key.as_bytes())
            .payload(&message.payload)
            .partition(partition_number)
            .headers(Self::headers(message));

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| TransportError::SendFailed {
                bucket: partition,
                message: e.to_string(),
            })?;

        Ok(async move {
            match delivery.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err((e, _))) => Err(TransportError::SendFailed {
                    bucket: partition,
                    message: e.to_string(),
                }),
                Err(_) => Err(TransportError::SendFailed {
                    bucket: partition,
                    message: "producer dropped the delivery".to_string(),
                }),
            }
        }
        .boxed())
    }
}
