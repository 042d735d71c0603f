//! Maps free-text prover, wallet and explorer errors onto [`ErrorType`].
//!
//! Messages often contain several matching phrases ("broadcast failed:
//! insufficient funds"), so rules are checked in table order and the first
//! match wins.

use crate::domain::errors::ErrorType;

/// (type, phrases) in precedence order. Phrases are lowercase.
pub const ERROR_PATTERNS: &[(ErrorType, &[&str])] = &[
    (
        ErrorType::UtxoBurned,
        &[
            "duplicate funding utxo",
            "funding utxo already",
            "utxo already used",
            "utxo already spent",
            "already spent",
            "burned",
            "txn-mempool-conflict",
            "bad-txns-inputs-missingorspent",
            "missing inputs",
        ],
    ),
    (
        ErrorType::AllReserved,
        &["already reserved", "utxos are reserved", "all_reserved"],
    ),
    (
        ErrorType::InsufficientFunds,
        &[
            "insufficient funds",
            "insufficient balance",
            "insufficient_funds",
            "not enough funds",
            "not enough balance",
        ],
    ),
    (
        ErrorType::NeedSplit,
        &["need split", "need_split", "needs to be split", "split utxo", "split your utxo"],
    ),
    (
        ErrorType::UserRejected,
        &[
            "user rejected",
            "user denied",
            "rejected by user",
            "user cancelled",
            "user canceled",
            "rejected the request",
            "signing request rejected",
        ],
    ),
    (
        ErrorType::NetworkError,
        &[
            "network",
            "timeout",
            "timed out",
            "failed to fetch",
            "connection",
            "econnrefused",
            "bad gateway",
            "service unavailable",
        ],
    ),
    (
        ErrorType::BroadcastFailed,
        &["broadcast", "sendrawtransaction", "mempool min fee not met", "non-final"],
    ),
    (
        ErrorType::ValidationError,
        &["validation failed", "invalid spell", "invalid address", "invalid amount"],
    ),
];

/// Classify an error message. Unmatched text is [`ErrorType::Unknown`].
pub fn parse_error_type(message: &str) -> ErrorType {
    let lower = message.to_lowercase();
    ERROR_PATTERNS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(error_type, _)| *error_type)
        .unwrap_or(ErrorType::Unknown)
}
