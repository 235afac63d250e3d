//! Recognition of standard output scripts.

use serde::{Deserialize, Serialize};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// Spending key extracted from an output script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecognizedKey {
    /// Raw public key of a pay-to-pubkey output
    Pubkey(Vec<u8>),
    /// HASH160 of a public key (pay-to-pubkey-hash)
    PubkeyHash([u8; 20]),
    /// HASH160 of a redeem script (pay-to-script-hash)
    ScriptHash([u8; 20]),
}

pub trait ScriptRecognizer {
    fn recognize(&self, script: &[u8]) -> Option<RecognizedKey>;
}

/// Pattern matcher for P2PK, P2PKH and P2SH outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardScripts;

impl ScriptRecognizer for StandardScripts {
    fn recognize(&self, script: &[u8]) -> Option<RecognizedKey> {
        match script {
            [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
                if hash.len() == 20 =>
            {
                Some(RecognizedKey::PubkeyHash(to_array(hash)))
            }
            [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
                Some(RecognizedKey::ScriptHash(to_array(hash)))
            }
            [push, key @ .., OP_CHECKSIG]
                if (*push == 33 || *push == 65) && key.len() == *push as usize =>
            {
                Some(RecognizedKey::Pubkey(key.to_vec()))
            }
            _ => None,
        }
    }
}

fn to_array(bytes: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    out
}
