//! Narrow block/log surface over an ethers provider.
//!
//! The pricing core consumes exactly three things from the chain: point
//! reads (`eth_call` via the multicall executor), block metadata, and a
//! forward log subscription. The subscription is a broadcast channel fed by
//! a polling task, so any number of adapters can follow the same log stream
//! without duplicating RPC traffic.

use anyhow::Result;
use ethers::prelude::{Http, Middleware, Provider};
use ethers::types::{Address, Filter, Log};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct ChainSource {
    provider: Arc<Provider<Http>>,
    log_sender: broadcast::Sender<Log>,
    poll_interval: Duration,
}

impl ChainSource {
    /// `capacity` bounds the broadcast buffer; slow subscribers that fall
    /// further behind than this lose the oldest logs and observe a lag
    /// error, which event-backed adapters treat as a re-warm signal.
    pub fn new(provider: Arc<Provider<Http>>, poll_interval: Duration, capacity: usize) -> Self {
        let (log_sender, _) = broadcast::channel(capacity);
        Self {
            provider,
            log_sender,
            poll_interval,
        }
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }

    /// Subscribes to the shared log stream. Every subscriber sees every log
    /// published after the call.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<Log> {
        self.log_sender.subscribe()
    }

    pub async fn latest_block(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    pub async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block = self
            .provider
            .get_block(block_number)
            .await?
            .ok_or_else(|| anyhow::anyhow!("block {block_number} not found"))?;
        Ok(block.timestamp.as_u64())
    }

    /// Spawns the polling task that feeds the shared log stream with logs
    /// emitted by `addresses` from `from_block` forward. The task runs until
    /// aborted; transient RPC errors are logged and retried on the next
    /// tick.
    pub fn spawn_log_poller(&self, addresses: Vec<Address>, from_block: u64) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let sender = self.log_sender.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut next_block = from_block;
            loop {
                match provider.get_block_number().await {
                    Ok(latest) => {
                        let latest = latest.as_u64();
                        if latest >= next_block {
                            let filter = Filter::new()
                                .address(addresses.clone())
                                .from_block(next_block)
                                .to_block(latest);
                            match provider.get_logs(&filter).await {
                                Ok(logs) => {
                                    debug!(
                                        from = next_block,
                                        to = latest,
                                        count = logs.len(),
                                        "log poll tick"
                                    );
                                    for log in logs {
                                        // send only fails with zero subscribers; harmless
                                        let _ = sender.send(log);
                                    }
                                    next_block = latest + 1;
                                }
                                Err(e) => {
                                    warn!(error = %e, from = next_block, "get_logs failed, will retry");
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "get_block_number failed, will retry"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        })
    }
}
