//! Ordered keys for the spent and address indexes
//!
//! Keys are written so that byte-wise ordering in the backing store matches
//! the logical order. Address keys group by address, then by asset name,
//! then by block height and position inside the block, both big-endian.
//! Iterating an address and asset prefix yields that asset's history by
//! height; a bare address prefix visits one asset's full history after
//! another. Values use the regular little-endian wire encoding.

use crate::encode::{write_var_bytes, Decodable, Encodable, Reader};
use crate::error::{ConsensusError, Result};
use crate::script::{is_pay_to_pubkey_hash, is_pay_to_script_hash};
use crate::types::{Amount, ByteString, Hash};

/// Address kinds recorded by the address index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AddressType {
    PubKeyHash = 1,
    ScriptHash = 2,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AddressType::PubKeyHash),
            2 => Some(AddressType::ScriptHash),
            _ => None,
        }
    }
}

/// Indexed address of an output script, if it has one
pub fn script_address(script: &[u8]) -> Option<(AddressType, [u8; 20])> {
    let (kind, range) = if is_pay_to_pubkey_hash(script) {
        (AddressType::PubKeyHash, 3..23)
    } else if is_pay_to_script_hash(script) {
        (AddressType::ScriptHash, 2..22)
    } else {
        return None;
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&script[range]);
    Some((kind, hash))
}

fn read_address_type(r: &mut Reader<'_>) -> Result<AddressType> {
    let tag = r.read_u8()?;
    AddressType::from_u8(tag).ok_or_else(|| ConsensusError::Serialization(format!("unknown address type {}", tag)))
}

fn read_string(r: &mut Reader<'_>) -> Result<String> {
    String::from_utf8(r.read_var_bytes()?)
        .map_err(|_| ConsensusError::Serialization("asset name is not utf-8".to_string()))
}

fn read_u32_be(r: &mut Reader<'_>) -> Result<u32> {
    Ok(u32::from_be_bytes(r.read_array()?))
}

/// Spent index key: the spent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpentIndexKey {
    pub txid: Hash,
    pub output_index: u32,
}

impl Encodable for SpentIndexKey {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.txid);
        w.extend_from_slice(&self.output_index.to_le_bytes());
    }
}

impl Decodable for SpentIndexKey {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(SpentIndexKey { txid: r.read_array()?, output_index: r.read_u32_le()? })
    }
}

/// Spent index value: where and how the output was spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentIndexValue {
    pub txid: Hash,
    pub input_index: u32,
    pub block_height: u32,
    pub amount: Amount,
    pub address_type: Option<AddressType>,
    pub address_hash: [u8; 20],
}

impl Encodable for SpentIndexValue {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.txid);
        w.extend_from_slice(&self.input_index.to_le_bytes());
        w.extend_from_slice(&self.block_height.to_le_bytes());
        w.extend_from_slice(&self.amount.to_le_bytes());
        // Zero marks an output without an indexed address
        let kind = self.address_type.map_or(0, |t| t as u32);
        w.extend_from_slice(&kind.to_le_bytes());
        w.extend_from_slice(&self.address_hash);
    }
}

impl Decodable for SpentIndexValue {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        let txid = r.read_array()?;
        let input_index = r.read_u32_le()?;
        let block_height = r.read_u32_le()?;
        let amount = r.read_u64_le()? as Amount;
        let kind = r.read_u32_le()?;
        let address_type = match kind {
            0 => None,
            n => Some(
                u8::try_from(n)
                    .ok()
                    .and_then(AddressType::from_u8)
                    .ok_or_else(|| ConsensusError::Serialization(format!("unknown address type {}", n)))?,
            ),
        };
        Ok(SpentIndexValue { txid, input_index, block_height, amount, address_type, address_hash: r.read_array()? })
    }
}

/// Address index key: one credit or debit of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressIndexKey {
    pub address_type: AddressType,
    pub address_hash: [u8; 20],
    pub asset: String,
    pub block_height: u32,
    /// Position of the transaction inside its block
    pub tx_index: u32,
    pub txid: Hash,
    pub index: u32,
    pub spending: bool,
}

impl Encodable for AddressIndexKey {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.push(self.address_type as u8);
        w.extend_from_slice(&self.address_hash);
        write_var_bytes(w, self.asset.as_bytes());
        w.extend_from_slice(&self.block_height.to_be_bytes());
        w.extend_from_slice(&self.tx_index.to_be_bytes());
        w.extend_from_slice(&self.txid);
        w.extend_from_slice(&self.index.to_le_bytes());
        w.push(self.spending as u8);
    }
}

impl Decodable for AddressIndexKey {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(AddressIndexKey {
            address_type: read_address_type(r)?,
            address_hash: r.read_array()?,
            asset: read_string(r)?,
            block_height: read_u32_be(r)?,
            tx_index: read_u32_be(r)?,
            txid: r.read_array()?,
            index: r.read_u32_le()?,
            spending: r.read_u8()? != 0,
        })
    }
}

/// Address unspent key: one unspent output of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressUnspentKey {
    pub address_type: AddressType,
    pub address_hash: [u8; 20],
    pub asset: String,
    pub txid: Hash,
    pub index: u32,
}

impl Encodable for AddressUnspentKey {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.push(self.address_type as u8);
        w.extend_from_slice(&self.address_hash);
        write_var_bytes(w, self.asset.as_bytes());
        w.extend_from_slice(&self.txid);
        w.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl Decodable for AddressUnspentKey {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(AddressUnspentKey {
            address_type: read_address_type(r)?,
            address_hash: r.read_array()?,
            asset: read_string(r)?,
            txid: r.read_array()?,
            index: r.read_u32_le()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressUnspentValue {
    pub amount: Amount,
    pub script: ByteString,
    pub block_height: u32,
}

impl Encodable for AddressUnspentValue {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.amount.to_le_bytes());
        write_var_bytes(w, &self.script);
        w.extend_from_slice(&self.block_height.to_le_bytes());
    }
}

impl Decodable for AddressUnspentValue {
    fn consensus_decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(AddressUnspentValue {
            amount: r.read_u64_le()? as Amount,
            script: r.read_var_bytes()?,
            block_height: r.read_u32_le()?,
        })
    }
}

/// Prefix selecting every address index entry of an address
pub fn address_prefix(address_type: AddressType, address_hash: &[u8; 20]) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(address_type as u8);
    key.extend_from_slice(address_hash);
    key
}

/// Prefix selecting the entries of an address for one asset
pub fn address_asset_prefix(address_type: AddressType, address_hash: &[u8; 20], asset: &str) -> Vec<u8> {
    let mut key = address_prefix(address_type, address_hash);
    write_var_bytes(&mut key, asset.as_bytes());
    key
}

/// Seek key for the entries of an address and asset from `height` onwards
pub fn address_height_prefix(address_type: AddressType, address_hash: &[u8; 20], asset: &str, height: u32) -> Vec<u8> {
    let mut key = address_asset_prefix(address_type, address_hash, asset);
    key.extend_from_slice(&height.to_be_bytes());
    key
}
