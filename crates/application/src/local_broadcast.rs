// 进程内扇出：每个订阅者一条有界出站队列
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc::error::SendTimeoutError, RwLock};

use crate::broadcaster::{
    BroadcastError, BroadcastReport, Delivery, FanoutEvent, MessageBroadcaster, OutboundSender,
    SubscriberId, Topic,
};

pub struct LocalMessageBroadcaster {
    topics: RwLock<HashMap<Topic, HashMap<SubscriberId, OutboundSender>>>,
    enqueue_timeout: Duration,
}

impl LocalMessageBroadcaster {
    pub fn new(enqueue_timeout: Duration) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            enqueue_timeout,
        }
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .read()
            .await
            .get(&topic)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    async fn prune(&self, stale: &[SubscriberId]) {
        let mut topics = self.topics.write().await;
        for subscribers in topics.values_mut() {
            for id in stale {
                subscribers.remove(id);
            }
        }
        topics.retain(|_, subscribers| !subscribers.is_empty());
    }
}

impl Default for LocalMessageBroadcaster {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl MessageBroadcaster for LocalMessageBroadcaster {
    async fn subscribe(&self, topic: Topic, subscriber: SubscriberId, outbound: OutboundSender) {
        self.topics
            .write()
            .await
            .entry(topic)
            .or_default()
            .insert(subscriber, outbound);
    }

    async fn unsubscribe(&self, topic: Topic, subscriber: SubscriberId) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(&topic) {
            subscribers.remove(&subscriber);
            if subscribers.is_empty() {
                topics.remove(&topic);
            }
        }
    }

    async fn remove_subscriber(&self, subscriber: SubscriberId) {
        self.prune(&[subscriber]).await;
    }

    async fn broadcast(
        &self,
        topic: Topic,
        event: FanoutEvent,
    ) -> Result<BroadcastReport, BroadcastError> {
        let targets: Vec<(SubscriberId, OutboundSender)> = {
            let topics = self.topics.read().await;
            match topics.get(&topic) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, sender)| (*id, sender.clone()))
                    .collect(),
                None => return Ok(BroadcastReport::default()),
            }
        };

        let delivery = Delivery {
            topic: topic.to_string(),
            event,
        };
        let timeout = self.enqueue_timeout;
        let outcomes = join_all(targets.into_iter().map(|(id, sender)| {
            let delivery = delivery.clone();
            async move { (id, sender.send_timeout(delivery, timeout).await) }
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut stale = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    report.dropped += 1;
                    tracing::warn!(subscriber = %id, topic = %topic, "订阅者队列已满，丢弃本次投递");
                }
                Err(SendTimeoutError::Closed(_)) => stale.push(id),
            }
        }

        if !stale.is_empty() {
            report.pruned = stale.len();
            self.prune(&stale).await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{RoomId, UserId};
    use tokio::sync::mpsc;

    fn pong() -> FanoutEvent {
        FanoutEvent::Pong
    }

    #[tokio::test]
    async fn delivers_only_to_topic_subscribers() {
        let hub = LocalMessageBroadcaster::default();
        let room = RoomId::generate();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        hub.subscribe(Topic::Room(room), SubscriberId::generate(), tx_a)
            .await;
        hub.subscribe(Topic::Room(RoomId::generate()), SubscriberId::generate(), tx_b)
            .await;

        let report = hub.broadcast(Topic::Room(room), pong()).await.unwrap();
        assert_eq!(report.delivered, 1);

        let delivery = rx_a.recv().await.unwrap();
        assert_eq!(delivery.topic, format!("room.{room}"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_blocking_others() {
        let hub = LocalMessageBroadcaster::new(Duration::from_millis(20));
        let topic = Topic::User(UserId::generate());
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        hub.subscribe(topic, SubscriberId::generate(), slow_tx).await;
        hub.subscribe(topic, SubscriberId::generate(), fast_tx).await;

        let first = hub.broadcast(topic, pong()).await.unwrap();
        assert_eq!(first.delivered, 2);

        // 慢订阅者的队列已满
        let second = hub.broadcast(topic, pong()).await.unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);

        assert!(fast_rx.recv().await.is_some());
        assert!(fast_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let hub = LocalMessageBroadcaster::default();
        let topic = Topic::Room(RoomId::generate());
        let (tx, rx) = mpsc::channel(1);
        hub.subscribe(topic, SubscriberId::generate(), tx).await;
        drop(rx);

        let report = hub.broadcast(topic, pong()).await.unwrap();
        assert_eq!(report.pruned, 1);
        assert_eq!(hub.subscriber_count(topic).await, 0);
    }

    #[tokio::test]
    async fn remove_subscriber_clears_every_topic() {
        let hub = LocalMessageBroadcaster::default();
        let room = RoomId::generate();
        let id = SubscriberId::generate();
        let (tx, _rx) = mpsc::channel(1);
        hub.subscribe(Topic::Room(room), id, tx.clone()).await;
        hub.subscribe(Topic::Location(room), id, tx).await;

        hub.remove_subscriber(id).await;
        assert_eq!(hub.subscriber_count(Topic::Room(room)).await, 0);
        assert_eq!(hub.subscriber_count(Topic::Location(room)).await, 0);
    }
}
