//! Transaction import and input/output linking
//!
//! Inputs whose spent output has not been seen yet are parked in the
//! unlinked-input set under `(prevout_hash, prevout_pos)`. Importing the
//! transaction that creates that output completes the link.

use crate::error::{BlockIndexerError, Result};
use crate::models::*;
use crate::store::{IndexStore, Key};
use block_parser::{Hash256, RecognizedKey, ScriptRecognizer, TxRecord};

/// Result of importing one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedTx {
    pub tx_id: TxId,
    /// False when the transaction was already indexed
    pub is_new: bool,
    pub value_in: Option<i64>,
    pub value_out: i64,
    /// Previously imported transactions whose inputs were linked by this one's outputs
    pub resolved: Vec<TxId>,
}

/// Look a transaction up by hash and return its id and value totals.
pub fn tx_find_id_and_value(
    store: &IndexStore,
    hash: &Hash256,
) -> Result<Option<(TxId, Option<i64>, i64)>> {
    match store.tx_id_by_hash(hash)? {
        Some(id) => {
            let tx = store.require_transaction(id)?;
            Ok(Some((id, tx.value_in(), tx.value_out)))
        }
        None => Ok(None),
    }
}

/// Import a transaction, or reuse it if its hash is already known.
pub fn import_tx<R: ScriptRecognizer>(
    store: &mut IndexStore,
    recognizer: &R,
    record: &TxRecord,
) -> Result<LinkedTx> {
    if let Some((tx_id, value_in, value_out)) = tx_find_id_and_value(store, &record.hash)? {
        return Ok(LinkedTx {
            tx_id,
            is_new: false,
            value_in,
            value_out,
            resolved: Vec::new(),
        });
    }

    let value_out = record.value_out().ok_or_else(|| {
        BlockIndexerError::invariant(format!(
            "output sum of transaction {} overflowed",
            record.hash
        ))
    })?;
    let tx_id = store.next_tx_id()?;
    let is_coinbase = record.is_coinbase();

    // Outputs
    for (pos, output) in record.outputs.iter().enumerate() {
        let pubkey_id = match recognizer.recognize(&output.script) {
            Some(key) => Some(pubkey_id_for(store, key)?),
            None => None,
        };
        let txout = TxOut {
            tx_id,
            pos: pos as u32,
            value: output.value,
            script: output.script.clone(),
            pubkey_id,
        };
        store.put(&Key::TxOut(txout.id()), &txout)?;
    }

    // Inputs
    let mut linked_value_in = 0i64;
    let mut unlinked_inputs = 0u32;
    for (pos, input) in record.inputs.iter().enumerate() {
        let mut txin = TxIn {
            tx_id,
            pos: pos as u32,
            prevout_hash: input.prevout_hash,
            prevout_pos: input.prevout_pos,
            script_sig: input.script_sig.clone(),
            sequence: input.sequence,
            txout_id: None,
        };

        if !is_coinbase {
            match find_txout(store, &input.prevout_hash, input.prevout_pos)? {
                Some(txout) => {
                    txin.txout_id = Some(txout.id());
                    linked_value_in = checked_value(linked_value_in.checked_add(txout.value))?;
                }
                None => {
                    unlinked_inputs += 1;
                    store.push_unique(
                        &Key::UnlinkedInputs(input.prevout_hash, input.prevout_pos),
                        txin.id(),
                    )?;
                }
            }
        }

        store.put(&Key::TxIn(txin.id()), &txin)?;
    }

    let tx = Transaction {
        id: tx_id,
        hash: record.hash,
        version: record.version,
        lock_time: record.lock_time,
        size: record.size,
        is_coinbase,
        input_count: record.inputs.len() as u32,
        output_count: record.outputs.len() as u32,
        value_out,
        linked_value_in,
        unlinked_inputs,
    };
    store.put(&Key::Transaction(tx_id), &tx)?;
    store.put(&Key::TxByHash(record.hash), &tx_id)?;

    let resolved = resolve_unlinked(store, &tx)?;
    if unlinked_inputs > 0 {
        tracing::debug!("Transaction {} has {} unlinked inputs", record.hash, unlinked_inputs);
    }

    Ok(LinkedTx {
        tx_id,
        is_new: true,
        value_in: tx.value_in(),
        value_out: tx.value_out,
        resolved,
    })
}

fn find_txout(
    store: &IndexStore,
    prevout_hash: &Hash256,
    prevout_pos: u32,
) -> Result<Option<TxOut>> {
    match store.tx_id_by_hash(prevout_hash)? {
        Some(tx_id) => store.txout(TxOutId {
            tx_id,
            pos: prevout_pos,
        }),
        None => Ok(None),
    }
}

/// Bind every parked input that spends one of `tx`'s outputs.
fn resolve_unlinked(store: &mut IndexStore, tx: &Transaction) -> Result<Vec<TxId>> {
    let mut resolved = Vec::new();

    for pos in 0..tx.output_count {
        let waiting: Vec<TxInId> = store
            .take(&Key::UnlinkedInputs(tx.hash, pos))?
            .unwrap_or_default();
        if waiting.is_empty() {
            continue;
        }

        let txout_id = TxOutId { tx_id: tx.id, pos };
        let txout = store.txout(txout_id)?.ok_or_else(|| {
            BlockIndexerError::invariant(format!("output {}:{} missing after insert", tx.hash, pos))
        })?;

        for txin_id in waiting {
            let mut txin = store.txin(txin_id)?.ok_or_else(|| {
                BlockIndexerError::invariant(format!("unlinked input {:?} has no row", txin_id))
            })?;
            if txin.txout_id.is_some() {
                continue;
            }
            txin.txout_id = Some(txout_id);
            store.put(&Key::TxIn(txin_id), &txin)?;

            let mut spender = store.require_transaction(txin_id.tx_id)?;
            spender.unlinked_inputs = spender.unlinked_inputs.checked_sub(1).ok_or_else(|| {
                BlockIndexerError::invariant(format!(
                    "transaction {} has no unlinked inputs left",
                    spender.hash
                ))
            })?;
            spender.linked_value_in =
                checked_value(spender.linked_value_in.checked_add(txout.value))?;
            store.put(&Key::Transaction(spender.id), &spender)?;

            if !resolved.contains(&spender.id) {
                resolved.push(spender.id);
            }
        }
    }

    Ok(resolved)
}

fn pubkey_id_for(store: &mut IndexStore, key: RecognizedKey) -> Result<PubkeyId> {
    if let Some(id) = store.get(&Key::PubkeyByKey(key.clone()))? {
        return Ok(id);
    }
    let id = store.next_pubkey_id()?;
    store.put(&Key::PubkeyByKey(key.clone()), &id)?;
    store.put(&Key::Pubkey(id), &Pubkey { id, key })?;
    Ok(id)
}

fn checked_value(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| BlockIndexerError::invariant("input value sum overflowed"))
}
