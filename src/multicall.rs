//! Batched `eth_call` execution through a Multicall3 contract.
//!
//! Pool warm-up snapshots read many pools at one block; batching them into a
//! single RPC request keeps provider load and latency bounded. Identical
//! calls are coalesced before dispatch and the results re-expanded in the
//! original order.

use anyhow::Result;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use log::{debug, warn};
use std::sync::Arc;

use crate::metrics;

/// Calls per batch beyond which public RPC providers start rejecting
/// requests outright.
const MAX_BATCH_SIZE: usize = 200;
const MIN_BATCH_SIZE: usize = 50;

/// A single call to be batched.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Call {
    pub target: Address,
    pub call_data: Bytes,
}

/// Multicall3 batch executor.
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    provider: Arc<M>,
    contract_address: Address,
    batch_size: usize,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, contract_address: Address, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "multicall batch size {} exceeds provider maximum ({}), capping",
                batch_size, MAX_BATCH_SIZE
            );
        }
        Self {
            provider,
            contract_address,
            batch_size: batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
        }
    }

    /// Runs a batch of calls, optionally pinned to a specific block.
    ///
    /// Returns one `Bytes` entry per input call, in input order. Failed
    /// sub-calls come back as empty bytes (`allowFailure` is set), so a bad
    /// pool never poisons its batch.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls before dispatch
        let mut unique_calls = indexmap::IndexMap::new();
        let mut original_indices = vec![0; calls.len()];
        for (i, call) in calls.iter().enumerate() {
            let (index, _) = unique_calls.insert_full((call.target, call.call_data.clone()), ());
            original_indices[i] = index;
        }
        let unique_call_vec: Vec<_> = unique_calls
            .into_keys()
            .map(|(target, call_data)| Call { target, call_data })
            .collect();
        debug!(
            "multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        let mut unique_results: Vec<Bytes> = Vec::with_capacity(unique_call_vec.len());
        for chunk in unique_call_vec.chunks(self.batch_size) {
            metrics::record_multicall_batch_size(chunk.len() as f64);
            let return_data = self.aggregate3(chunk, block).await?;
            unique_results.extend(return_data);
        }

        Ok(original_indices
            .into_iter()
            .map(|index| unique_results[index].clone())
            .collect())
    }

    /// Encodes and executes `aggregate3((address,bool,bytes)[])` directly, so
    /// no pre-built Multicall3 binding is required.
    async fn aggregate3(&self, calls: &[Call], block: Option<BlockId>) -> Result<Vec<Bytes>> {
        let call_tokens: Vec<Token> = calls
            .iter()
            .map(|call| {
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(true), // allowFailure
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        let result_tuple = ParamType::Tuple(vec![ParamType::Bool, ParamType::Bytes]);
        #[allow(deprecated)]
        let function = Function {
            name: "aggregate3".to_string(),
            inputs: vec![Param {
                name: "calls".to_string(),
                kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Bool,
                    ParamType::Bytes,
                ]))),
                internal_type: None,
            }],
            outputs: vec![Param {
                name: "returnData".to_string(),
                kind: ParamType::Array(Box::new(result_tuple.clone())),
                internal_type: None,
            }],
            constant: None,
            state_mutability: StateMutability::Payable,
        };
        let calldata = function.encode_input(&[Token::Array(call_tokens)])?;

        let tx: ethers::types::transaction::eip2718::TypedTransaction = TransactionRequest::new()
            .to(self.contract_address)
            .data(calldata)
            .into();
        let response = self
            .provider
            .call(&tx, block)
            .await
            .map_err(|e| anyhow::anyhow!("multicall eth_call failed: {e}"))?;

        let decoded = ethers::abi::decode(&[ParamType::Array(Box::new(result_tuple))], &response)?;
        let results_array = decoded
            .into_iter()
            .next()
            .and_then(|t| t.into_array())
            .ok_or_else(|| anyhow::anyhow!("invalid multicall response format"))?;

        let mut return_data = Vec::with_capacity(results_array.len());
        for result_token in results_array {
            match result_token {
                Token::Tuple(mut tuple) if tuple.len() >= 2 => {
                    // (bool success, bytes returnData); failures decode to empty bytes
                    if let Token::Bytes(data) = tuple.remove(1) {
                        return_data.push(Bytes::from(data));
                    } else {
                        return_data.push(Bytes::default());
                    }
                }
                _ => return_data.push(Bytes::default()),
            }
        }
        Ok(return_data)
    }
}
