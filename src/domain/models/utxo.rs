use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a UTXO in `txid:vout` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtxoId(String);

impl UtxoId {
    pub fn new(txid: &str, vout: u32) -> Self {
        Self(format!("{}:{}", txid, vout))
    }

    /// Parse and validate a `txid:vout` string
    pub fn parse(value: &str) -> Result<Self, String> {
        let outpoint = OutPoint::from_str(value)
            .map_err(|e| format!("Invalid UTXO id '{}': {}", value, e))?;
        Ok(Self::new(&outpoint.txid.to_string(), outpoint.vout))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wallet output as reported by the explorer. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRecord {
    pub id: UtxoId,
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    pub confirmed: bool,
}

impl UtxoRecord {
    pub fn new(txid: impl Into<String>, vout: u32, value_sats: u64, confirmed: bool) -> Self {
        let txid = txid.into();
        Self {
            id: UtxoId::new(&txid, vout),
            txid,
            vout,
            value_sats,
            confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "5cff4e4ff471c0341bf6154ba869e52a143f68487b78587f2db5a57f213fc518";

    #[test]
    fn test_id_is_txid_colon_vout() {
        let utxo = UtxoRecord::new(TXID, 1, 500_000, true);
        assert_eq!(utxo.id.as_str(), format!("{}:1", TXID));
    }

    #[test]
    fn test_parse_valid_id() {
        let id = UtxoId::parse(&format!("{}:0", TXID)).unwrap();
        assert_eq!(id, UtxoId::new(TXID, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(UtxoId::parse("not-a-utxo").is_err());
        assert!(UtxoId::parse(&format!("{}:x", TXID)).is_err());
    }
}
