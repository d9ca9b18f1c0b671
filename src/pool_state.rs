//! Event-backed pool state, indexed by block.
//!
//! Each tracked pool keeps a small history of reserve snapshots keyed by the
//! block they were committed at. The log consumer is the only writer; pricing
//! reads point-in-time snapshots and therefore always sees a state that was
//! consistent at some block at or before its query block.

use anyhow::Result;
use dashmap::DashMap;
use ethers::prelude::Middleware;
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::keccak256;
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::multicall::{Call, Multicall};

/// `Sync(uint112 reserve0, uint112 reserve1)` — emitted by constant-product
/// pairs after every reserve mutation.
pub static SYNC_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("Sync(uint112,uint112)")));

/// Constant-product pool state, valid at exactly one block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmPoolState {
    pub reserves0: U256,
    pub reserves1: U256,
    pub fee_bps: u32,
}

/// Block-indexed state histories for a set of pools.
///
/// Snapshots are visible to pricing one block after they were committed:
/// `get_state(addr, n)` returns the latest snapshot with block strictly
/// below `n`, so a pricing call at block N only sees logs up to N−1 and
/// never races an unconfirmed update.
pub struct PoolStateMap {
    histories: DashMap<Address, BTreeMap<u64, AmmPoolState>>,
    /// Per-pool "being warmed" markers; the only lock held across a
    /// suspension point.
    warming: DashMap<Address, ()>,
    retention_blocks: u64,
}

impl PoolStateMap {
    pub fn new(retention_blocks: u64) -> Self {
        Self {
            histories: DashMap::new(),
            warming: DashMap::new(),
            retention_blocks,
        }
    }

    /// Records a snapshot committed at `block_number` and prunes history
    /// beyond the retention window. The newest snapshot is never pruned.
    pub fn set_state(&self, pool: Address, state: AmmPoolState, block_number: u64) {
        let mut history = self.histories.entry(pool).or_default();
        history.insert(block_number, state);

        if let Some(&newest) = history.keys().next_back() {
            let cutoff = newest.saturating_sub(self.retention_blocks);
            if cutoff > 0 {
                // the newest snapshot is always >= cutoff, so it survives
                let keep = history.split_off(&cutoff);
                *history = keep;
            }
        }
    }

    /// Latest snapshot committed strictly before `block_number`, or `None`
    /// when the pool has no usable history yet. Missing state means "no
    /// quote for this pool", never an error.
    pub fn get_state(&self, pool: Address, block_number: u64) -> Option<AmmPoolState> {
        let history = self.histories.get(&pool)?;
        history
            .range(..block_number)
            .next_back()
            .map(|(_, state)| state.clone())
    }

    /// Latest snapshot regardless of block, with the block it was committed
    /// at. Used for fee carry-over when applying logs.
    pub fn latest_state(&self, pool: Address) -> Option<(u64, AmmPoolState)> {
        let history = self.histories.get(&pool)?;
        history
            .iter()
            .next_back()
            .map(|(block, state)| (*block, state.clone()))
    }

    pub fn has_state(&self, pool: Address) -> bool {
        self.histories
            .get(&pool)
            .map(|h| !h.is_empty())
            .unwrap_or(false)
    }

    pub fn tracked_pools(&self) -> Vec<Address> {
        self.histories.iter().map(|entry| *entry.key()).collect()
    }

    /// Applies one log to the tracked state. `Sync` events on tracked pools
    /// produce the next snapshot at the log's block (the fee survives from
    /// the previous snapshot); anything else is ignored.
    pub fn process_log(&self, log: &Log) -> Option<AmmPoolState> {
        if log.topics.first() != Some(&*SYNC_TOPIC) {
            return None;
        }
        let block_number = log.block_number?.as_u64();
        if log.data.len() < 64 {
            warn!("malformed Sync event on {:?}, data too short", log.address);
            return None;
        }
        // Only pools this map has warmed are ours to track
        let (_, previous) = self.latest_state(log.address)?;

        let state = AmmPoolState {
            reserves0: U256::from_big_endian(&log.data[0..32]),
            reserves1: U256::from_big_endian(&log.data[32..64]),
            fee_bps: previous.fee_bps,
        };
        self.set_state(log.address, state.clone(), block_number);
        Some(state)
    }

    /// Warms not-yet-tracked pools from a batched `getReserves()` snapshot
    /// at the given block. Pools already tracked or mid-warm are skipped, so
    /// concurrent initializations converge on one snapshot per pool.
    pub async fn warm_pools<M: Middleware + 'static>(
        &self,
        multicall: &Multicall<M>,
        pools: &[(Address, u32)],
        block_number: u64,
    ) -> Result<usize> {
        let to_warm: Vec<(Address, u32)> = pools
            .iter()
            .filter(|(addr, _)| !self.has_state(*addr))
            .filter(|(addr, _)| self.warming.insert(*addr, ()).is_none())
            .copied()
            .collect();
        if to_warm.is_empty() {
            return Ok(0);
        }

        let selector = &keccak256("getReserves()")[..4];
        let calls: Vec<Call> = to_warm
            .iter()
            .map(|(addr, _)| Call {
                target: *addr,
                call_data: Bytes::from(selector.to_vec()),
            })
            .collect();

        let result = multicall
            .run(calls, Some(block_number.into()))
            .await;
        let results = match result {
            Ok(results) => results,
            Err(e) => {
                for (addr, _) in &to_warm {
                    self.warming.remove(addr);
                }
                return Err(e);
            }
        };

        let mut warmed = 0;
        for ((addr, fee_bps), data) in to_warm.iter().zip(results) {
            self.warming.remove(addr);
            if data.len() < 64 {
                debug!("pool {:?} returned no reserves at block {}", addr, block_number);
                continue;
            }
            let state = AmmPoolState {
                reserves0: U256::from_big_endian(&data[0..32]),
                reserves1: U256::from_big_endian(&data[32..64]),
                fee_bps: *fee_bps,
            };
            self.set_state(*addr, state, block_number);
            warmed += 1;
        }
        debug!("warmed {} pools at block {}", warmed, block_number);
        Ok(warmed)
    }
}
