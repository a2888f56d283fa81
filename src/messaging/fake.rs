//! In-process broker for tests.
//!
//! Behaves like the subset of RabbitMQ the bridge uses: server-named reply
//! queues that buffer until consumed, one consumer per queue, deleting a queue
//! ends its consumer stream. A scripted worker can answer every published job,
//! any operation can be made to fail, and any operation can be made slow.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::broker::{Broker, BrokerChannel, BrokerError, Deliveries, PublishProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    OpenChannel,
    DeclareQueue,
    Publish,
    Consume,
    Cancel,
    DeleteQueue,
    CloseChannel,
}

#[derive(Debug, Clone)]
pub struct Published {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: PublishProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeStats {
    pub channels_opened: usize,
    pub channels_open: usize,
    pub queues_live: usize,
    pub consumers_active: usize,
    pub published: usize,
}

type Worker = Arc<dyn Fn(&Published) -> Vec<Vec<u8>> + Send + Sync>;
type Sender = mpsc::UnboundedSender<Result<Vec<u8>, BrokerError>>;
type Receiver = mpsc::UnboundedReceiver<Result<Vec<u8>, BrokerError>>;

struct Queue {
    tx: Sender,
    rx: Option<Receiver>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    channels_opened: usize,
    open_channels: HashSet<u64>,
    closes: HashMap<u64, usize>,
    queues: HashMap<String, Queue>,
    consumers: HashMap<String, String>,
    published: Vec<Published>,
    declared: Vec<String>,
    teardown: Vec<String>,
    faults: HashSet<Fault>,
    stalls: HashMap<Fault, Duration>,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<State>>,
    worker: Option<Worker>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(self, fault: Fault) -> Self {
        self.lock().faults.insert(fault);
        self
    }

    /// Make the operation behind `step` sleep for `delay` before it runs.
    pub fn with_stall(self, step: Fault, delay: Duration) -> Self {
        self.lock().stalls.insert(step, delay);
        self
    }

    /// Answer every published job with the payloads `worker` returns, sent to
    /// the job's `reply_to` queue in order.
    pub fn with_worker<F>(mut self, worker: F) -> Self
    where
        F: Fn(&Published) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        self.worker = Some(Arc::new(worker));
        self
    }

    /// Deliver `payload` to `queue` as if a worker had sent it.
    pub fn reply(&self, queue: &str, payload: &[u8]) {
        if let Some(q) = self.lock().queues.get(queue) {
            let _ = q.tx.send(Ok(payload.to_vec()));
        }
    }

    /// Break `queue`'s consumer stream with a transport error.
    pub fn break_delivery(&self, queue: &str) {
        if let Some(q) = self.lock().queues.get(queue) {
            let _ = q.tx.send(Err(BrokerError::Delivery("injected".into())));
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.lock().declared.clone()
    }

    /// `cancel <queue>`, `delete <queue>` and `close` entries in call order.
    pub fn teardown_log(&self) -> Vec<String> {
        self.lock().teardown.clone()
    }

    pub fn stats(&self) -> FakeStats {
        let state = self.lock();
        FakeStats {
            channels_opened: state.channels_opened,
            channels_open: state.open_channels.len(),
            queues_live: state.queues.len(),
            consumers_active: state.consumers.len(),
            published: state.published.len(),
        }
    }

    /// Give background teardown tasks a chance to finish.
    pub async fn settle(&self) {
        for _ in 0..200 {
            let stats = self.stats();
            if stats.channels_open == 0 && stats.queues_live == 0 && stats.consumers_active == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Every channel ever opened was closed exactly once, and no queue or
    /// consumer is left.
    #[track_caller]
    pub fn assert_released(&self) {
        let state = self.lock();
        assert!(state.open_channels.is_empty(), "channels left open: {:?}", state.open_channels);
        assert!(state.queues.is_empty(), "queues left: {:?}", state.queues.keys());
        assert!(state.consumers.is_empty(), "consumers left: {:?}", state.consumers);
        assert_eq!(state.closes.len(), state.channels_opened, "not every channel was closed");
        assert!(
            state.closes.values().all(|&n| n == 1),
            "channel closed more than once: {:?}",
            state.closes
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    async fn stall(&self, step: Fault) {
        let delay = self.lock().stalls.get(&step).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, fault: Fault) -> Result<(), String> {
        if self.lock().faults.contains(&fault) {
            Err(format!("injected {fault:?}"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for FakeBroker {
    type Channel = FakeChannel;

    async fn open_channel(&self) -> Result<FakeChannel, BrokerError> {
        self.stall(Fault::OpenChannel).await;
        self.check(Fault::OpenChannel).map_err(BrokerError::Channel)?;

        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.channels_opened += 1;
        state.open_channels.insert(id);

        Ok(FakeChannel {
            id,
            broker: self.clone(),
        })
    }
}

#[derive(Clone)]
pub struct FakeChannel {
    id: u64,
    broker: FakeBroker,
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        self.broker.stall(Fault::DeclareQueue).await;
        self.broker.check(Fault::DeclareQueue).map_err(BrokerError::Declare)?;

        let mut state = self.broker.lock();
        state.next_id += 1;
        let name = format!("amq.gen-{}-{}", self.id, state.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        state.queues.insert(name.clone(), Queue { tx, rx: Some(rx) });
        state.declared.push(name.clone());

        Ok(name)
    }

    async fn publish(
        &self,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        self.broker.stall(Fault::Publish).await;
        self.broker.check(Fault::Publish).map_err(BrokerError::Publish)?;

        let message = Published {
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
            properties,
        };
        let replies = self
            .broker
            .worker
            .as_ref()
            .map(|worker| worker(&message))
            .unwrap_or_default();

        let mut state = self.broker.lock();
        if let Some(queue) = state.queues.get(&message.properties.reply_to) {
            for payload in replies {
                let _ = queue.tx.send(Ok(payload));
            }
        }
        state.published.push(message);

        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Deliveries, BrokerError> {
        self.broker.stall(Fault::Consume).await;
        self.broker.check(Fault::Consume).map_err(BrokerError::Consume)?;

        let mut state = self.broker.lock();
        let rx = state
            .queues
            .get_mut(queue)
            .and_then(|q| q.rx.take())
            .ok_or_else(|| BrokerError::Consume(format!("no consumable queue {queue}")))?;
        state.consumers.insert(consumer_tag.to_string(), queue.to_string());

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.broker.stall(Fault::Cancel).await;
        let mut state = self.broker.lock();
        let queue = state.consumers.get(consumer_tag).cloned().unwrap_or_default();
        state.teardown.push(format!("cancel {queue}"));
        if state.faults.contains(&Fault::Cancel) {
            return Err(BrokerError::Cancel("injected".into()));
        }
        state.consumers.remove(consumer_tag);
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.broker.stall(Fault::DeleteQueue).await;
        let mut state = self.broker.lock();
        state.teardown.push(format!("delete {queue}"));
        if state.faults.contains(&Fault::DeleteQueue) {
            return Err(BrokerError::Delete("injected".into()));
        }
        state.queues.remove(queue);
        // A deleted queue takes its consumer with it.
        state.consumers.retain(|_, q| q != queue);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.broker.stall(Fault::CloseChannel).await;
        let mut state = self.broker.lock();
        state.teardown.push("close".to_string());
        *state.closes.entry(self.id).or_default() += 1;
        if state.faults.contains(&Fault::CloseChannel) {
            return Err(BrokerError::Close("injected".into()));
        }
        state.open_channels.remove(&self.id);
        Ok(())
    }
}
