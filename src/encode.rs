//! Binary wire format for consensus types
//!
//! Layouts are bit-exact with the network encoding: little-endian integers,
//! compact-size length prefixes, tagged confidential fields, issuance and
//! witness presence signalled out of band.

use crate::confidential::*;
use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// Upper bound on any decoded length prefix
const MAX_SIZE: u64 = 0x0200_0000;

pub trait Encodable {
    fn consensus_encode(&self, w: &mut Vec<u8>);
}

pub trait Decodable: Sized {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self>;
}

/// Serialize a value to a fresh buffer
pub fn serialize<T: Encodable + ?Sized>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.consensus_encode(&mut out);
    out
}

/// Deserialize a value, rejecting trailing bytes
pub fn deserialize<T: Decodable>(bytes: &[u8]) -> Result<T> {
    let mut reader = Reader::new(bytes);
    let value = T::consensus_decode(&mut reader)?;
    if !reader.is_empty() {
        return Err(ConsensusError::Serialization(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }
    Ok(value)
}

/// Cursor over an input buffer
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ConsensusError::Serialization(format!(
                "unexpected end of data: need {} bytes, have {}",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_compact_size(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        let (value, min) = match first {
            0xfd => (self.read_u16_le()? as u64, 0xfd),
            0xfe => (self.read_u32_le()? as u64, 0x1_0000),
            0xff => (self.read_u64_le()?, 0x1_0000_0000),
            n => return Ok(n as u64),
        };
        if value < min {
            return Err(ConsensusError::Serialization("non-canonical compact size".to_string()));
        }
        Ok(value)
    }

    fn read_length(&mut self) -> Result<usize> {
        let len = self.read_compact_size()?;
        if len > MAX_SIZE {
            return Err(ConsensusError::Serialization("size too large".to_string()));
        }
        Ok(len as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_length()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_vec<T: Decodable>(&mut self) -> Result<Vec<T>> {
        let len = self.read_length()?;
        // Cap the preallocation; each element still has to be decoded
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::consensus_decode(self)?);
        }
        Ok(items)
    }
}

pub fn write_compact_size(w: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => w.push(n as u8),
        0xfd..=0xffff => {
            w.push(0xfd);
            w.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            w.push(0xfe);
            w.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            w.push(0xff);
            w.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub fn write_var_bytes(w: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(w, bytes.len() as u64);
    w.extend_from_slice(bytes);
}

pub fn write_vec<T: Encodable>(w: &mut Vec<u8>, items: &[T]) {
    write_compact_size(w, items.len() as u64);
    for item in items {
        item.consensus_encode(w);
    }
}

/// Size of a compact-size prefix for `n`
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

impl Encodable for Vec<u8> {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        write_var_bytes(w, self);
    }
}

impl Decodable for Vec<u8> {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        r.read_var_bytes()
    }
}

// Confidential fields

fn read_commitment_tail(r: &mut Reader<'_>, prefix: u8) -> Result<Commitment> {
    let mut bytes = [0u8; COMMITTED_SIZE];
    bytes[0] = prefix;
    bytes[1..].copy_from_slice(r.read_bytes(COMMITTED_SIZE - 1)?);
    Ok(Commitment(bytes))
}

fn unrecognized_prefix() -> ConsensusError {
    ConsensusError::Serialization("Unrecognized serialization prefix".to_string())
}

impl Encodable for ConfidentialValue {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        match self {
            ConfidentialValue::Null => w.push(0),
            ConfidentialValue::Explicit(amount) => {
                w.push(1);
                w.extend_from_slice(&(*amount as u64).to_be_bytes());
            }
            ConfidentialValue::Confidential(c) => w.extend_from_slice(c.as_bytes()),
        }
    }
}

impl Decodable for ConfidentialValue {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(ConfidentialValue::Null),
            1 => Ok(ConfidentialValue::Explicit(r.read_u64_be()? as i64)),
            p if VALUE_COMMITMENT_PREFIXES.contains(&p) => {
                Ok(ConfidentialValue::Confidential(read_commitment_tail(r, p)?))
            }
            _ => Err(unrecognized_prefix()),
        }
    }
}

impl Encodable for ConfidentialAsset {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        match self {
            ConfidentialAsset::Null => w.push(0),
            ConfidentialAsset::Explicit(asset) => {
                w.push(1);
                w.extend_from_slice(asset.as_bytes());
            }
            ConfidentialAsset::Confidential(c) => w.extend_from_slice(c.as_bytes()),
        }
    }
}

impl Decodable for ConfidentialAsset {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(ConfidentialAsset::Null),
            1 => Ok(ConfidentialAsset::Explicit(AssetId(r.read_array()?))),
            p if ASSET_COMMITMENT_PREFIXES.contains(&p) => {
                Ok(ConfidentialAsset::Confidential(read_commitment_tail(r, p)?))
            }
            _ => Err(unrecognized_prefix()),
        }
    }
}

impl Encodable for ConfidentialNonce {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        match self {
            ConfidentialNonce::Null => w.push(0),
            ConfidentialNonce::Explicit(nonce) => {
                w.push(1);
                w.extend_from_slice(nonce);
            }
            ConfidentialNonce::Confidential(c) => w.extend_from_slice(c.as_bytes()),
        }
    }
}

impl Decodable for ConfidentialNonce {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(ConfidentialNonce::Null),
            1 => Ok(ConfidentialNonce::Explicit(r.read_array()?)),
            p if NONCE_COMMITMENT_PREFIXES.contains(&p) => {
                Ok(ConfidentialNonce::Confidential(read_commitment_tail(r, p)?))
            }
            _ => Err(unrecognized_prefix()),
        }
    }
}

impl Encodable for AssetIssuance {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.asset_blinding_nonce);
        w.extend_from_slice(&self.asset_entropy);
        self.amount.consensus_encode(w);
        self.inflation_keys.consensus_encode(w);
    }
}

impl Decodable for AssetIssuance {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(AssetIssuance {
            asset_blinding_nonce: r.read_array()?,
            asset_entropy: r.read_array()?,
            amount: ConfidentialValue::consensus_decode(r)?,
            inflation_keys: ConfidentialValue::consensus_decode(r)?,
        })
    }
}

// Transactions

impl Encodable for OutPoint {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.hash);
        w.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(OutPoint { hash: r.read_array()?, index: r.read_u32_le()? })
    }
}

impl Encodable for TransactionInput {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        let has_issuance = self.prevout.index != NULL_INDEX && self.has_issuance();
        if self.prevout.index == NULL_INDEX {
            self.prevout.consensus_encode(w);
        } else {
            debug_assert_eq!(self.prevout.index & !OUTPOINT_INDEX_MASK, 0);
            let mut index = self.prevout.index & OUTPOINT_INDEX_MASK;
            if has_issuance {
                index |= OUTPOINT_ISSUANCE_FLAG;
            }
            OutPoint { hash: self.prevout.hash, index }.consensus_encode(w);
        }
        write_var_bytes(w, &self.script_sig);
        w.extend_from_slice(&self.sequence.to_le_bytes());
        if has_issuance {
            self.asset_issuance.consensus_encode(w);
        }
    }
}

impl Decodable for TransactionInput {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        let raw = OutPoint::consensus_decode(r)?;
        let (prevout, has_issuance) = if raw.index == NULL_INDEX {
            (raw, false)
        } else if raw.index & OUTPOINT_PEGIN_FLAG != 0 {
            return Err(ConsensusError::Serialization("peg-in inputs are not supported".to_string()));
        } else {
            (
                OutPoint { hash: raw.hash, index: raw.index & OUTPOINT_INDEX_MASK },
                raw.index & OUTPOINT_ISSUANCE_FLAG != 0,
            )
        };
        let script_sig = r.read_var_bytes()?;
        let sequence = r.read_u32_le()?;
        let asset_issuance = if has_issuance {
            AssetIssuance::consensus_decode(r)?
        } else {
            AssetIssuance::default()
        };
        Ok(TransactionInput { prevout, script_sig, sequence, asset_issuance })
    }
}

impl Encodable for TransactionOutput {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.asset.consensus_encode(w);
        self.value.consensus_encode(w);
        self.nonce.consensus_encode(w);
        write_var_bytes(w, &self.script_pubkey);
    }
}

impl Decodable for TransactionOutput {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(TransactionOutput {
            asset: ConfidentialAsset::consensus_decode(r)?,
            value: ConfidentialValue::consensus_decode(r)?,
            nonce: ConfidentialNonce::consensus_decode(r)?,
            script_pubkey: r.read_var_bytes()?,
        })
    }
}

impl Encodable for TxInWitness {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        write_var_bytes(w, &self.issuance_amount_rangeproof);
        write_var_bytes(w, &self.inflation_keys_rangeproof);
        write_vec(w, &self.script_witness);
    }
}

impl Decodable for TxInWitness {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(TxInWitness {
            issuance_amount_rangeproof: r.read_var_bytes()?,
            inflation_keys_rangeproof: r.read_var_bytes()?,
            script_witness: r.read_vec()?,
        })
    }
}

impl Encodable for TxOutWitness {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        write_var_bytes(w, &self.surjection_proof);
        write_var_bytes(w, &self.rangeproof);
    }
}

impl Decodable for TxOutWitness {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(TxOutWitness { surjection_proof: r.read_var_bytes()?, rangeproof: r.read_var_bytes()? })
    }
}

/// Encode a transaction, optionally omitting witness data.
///
/// # Panics
///
/// Panics if the witness vectors are longer than the inputs or outputs.
pub fn encode_transaction(tx: &Transaction, with_witness: bool, w: &mut Vec<u8>) {
    assert!(tx.witness.inputs.len() <= tx.inputs.len());
    assert!(tx.witness.outputs.len() <= tx.outputs.len());

    let version = (tx.version as u16 as u32) | ((tx.tx_type as u32) << 16);
    w.extend_from_slice(&version.to_le_bytes());
    w.extend_from_slice(&tx.time.to_le_bytes());

    let flags: u8 = if with_witness && tx.has_witness() { 1 } else { 0 };
    w.push(flags);
    write_vec(w, &tx.inputs);
    write_vec(w, &tx.outputs);
    w.extend_from_slice(&tx.lock_time.to_le_bytes());
    if tx.tx_type != TxType::Normal as u16 {
        write_var_bytes(w, &tx.extra_payload);
    }
    if flags & 1 != 0 {
        let empty_in = TxInWitness::default();
        for i in 0..tx.inputs.len() {
            tx.witness.inputs.get(i).unwrap_or(&empty_in).consensus_encode(w);
        }
        let empty_out = TxOutWitness::default();
        for i in 0..tx.outputs.len() {
            tx.witness.outputs.get(i).unwrap_or(&empty_out).consensus_encode(w);
        }
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        encode_transaction(self, true, w);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        let raw_version = r.read_u32_le()?;
        let version = (raw_version & 0xffff) as u16 as i16;
        let tx_type = ((raw_version >> 16) & 0xffff) as u16;
        let time = r.read_u32_le()?;
        let mut flags = r.read_u8()?;
        let inputs: Vec<TransactionInput> = r.read_vec()?;
        let outputs: Vec<TransactionOutput> = r.read_vec()?;
        let lock_time = r.read_u32_le()?;
        let extra_payload = if tx_type != TxType::Normal as u16 {
            r.read_var_bytes()?
        } else {
            Vec::new()
        };

        let mut witness = TxWitness::default();
        if flags & 1 != 0 {
            flags ^= 1;
            for _ in 0..inputs.len() {
                witness.inputs.push(TxInWitness::consensus_decode(r)?);
            }
            for _ in 0..outputs.len() {
                witness.outputs.push(TxOutWitness::consensus_decode(r)?);
            }
            if witness.is_null() {
                return Err(ConsensusError::Serialization("Superfluous witness record".to_string()));
            }
        }
        if flags != 0 {
            return Err(ConsensusError::Serialization(
                "Unknown transaction optional data".to_string(),
            ));
        }

        Ok(Transaction { version, tx_type, time, inputs, outputs, lock_time, extra_payload, witness })
    }
}

// Blocks

/// Header fields covered by the block hash (version through nonce)
pub fn encode_header_core(header: &BlockHeader, w: &mut Vec<u8>) {
    w.extend_from_slice(&header.version.to_le_bytes());
    w.extend_from_slice(&header.prev_block_hash);
    w.extend_from_slice(&header.merkle_root);
    w.extend_from_slice(&header.time.to_le_bytes());
    w.extend_from_slice(&header.height.to_le_bytes());
    w.extend_from_slice(&header.bits.to_le_bytes());
    w.extend_from_slice(&header.nonce.to_le_bytes());
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        encode_header_core(self, w);
        self.prevout_stake.consensus_encode(w);
        write_var_bytes(w, &self.block_sig);
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(BlockHeader {
            version: r.read_i32_le()?,
            prev_block_hash: r.read_array()?,
            merkle_root: r.read_array()?,
            time: r.read_u32_le()?,
            height: r.read_u32_le()?,
            bits: r.read_u32_le()?,
            nonce: r.read_u32_le()?,
            prevout_stake: OutPoint::consensus_decode(r)?,
            block_sig: r.read_var_bytes()?,
        })
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.header.consensus_encode(w);
        write_vec(w, &self.transactions);
    }
}

impl Decodable for Block {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Block { header: BlockHeader::consensus_decode(r)?, transactions: r.read_vec()? })
    }
}
