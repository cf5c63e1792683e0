use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::config::{null_signature, NULL_ADDRESS, NULL_PUBLIC_KEY};
use super::crypto::{self, SignaturePair};

/// Payload carried by every coinbase transaction.
const COINBASE_DATA: &str = "coinbase tx";

/// Returns the current time as an ISO-8601 string with millisecond
/// precision, the `dateCreated` format used across the chain.
pub fn iso_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Raw transfer fields as submitted by a caller, before admission.
///
/// The data hash is never part of the submission; the ledger always derives
/// it from these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    /// Sender's address
    pub from: String,

    /// Recipient's address
    pub to: String,

    /// Amount being transferred
    pub value: u64,

    /// Transaction fee
    pub fee: u64,

    /// Timestamp when the transfer was created (ISO-8601)
    pub date_created: String,

    /// Optional opaque payload or comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Sender's public key
    pub sender_public_key: String,

    /// Signature over the derived data hash
    pub sender_signature: SignaturePair,
}

/// Represents a transaction in the blockchain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender's address
    pub from: String,

    /// Recipient's address
    pub to: String,

    /// Amount being transferred
    pub value: u64,

    /// Transaction fee
    pub fee: u64,

    /// Timestamp when the transfer was created (ISO-8601)
    pub date_created: String,

    /// Optional opaque payload or comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Sender's public key
    pub sender_public_key: String,

    /// Content-derived hash identifying this transaction
    pub transaction_data_hash: String,

    /// Signature over the data hash
    pub sender_signature: SignaturePair,

    /// Index of the block this transaction was mined into, once mined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mined_in_block_index: Option<u64>,

    /// Whether the value transfer executed, decided at mining time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_successful: Option<bool>,

    /// Whether this is a synthesized block-reward transaction
    #[serde(default)]
    pub is_coinbase: bool,
}

/// Hashing preimage for a transaction. Field declaration order fixes the
/// canonical serialization order, so independent implementations agree
/// bit-for-bit.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataHashFields<'a> {
    from: &'a str,
    to: &'a str,
    value: u64,
    fee: u64,
    date_created: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    sender_public_key: &'a str,
}

impl Transaction {
    /// Builds a pending transaction from submitted fields, deriving the
    /// data hash
    ///
    /// Caller-supplied fields are taken verbatim; the hash is always
    /// recomputed here and never trusted from the outside.
    pub fn from_data(data: TransactionData) -> Self {
        let transaction_data_hash = compute_data_hash(
            &data.from,
            &data.to,
            data.value,
            data.fee,
            &data.date_created,
            data.data.as_deref(),
            &data.sender_public_key,
        );

        Transaction {
            from: data.from,
            to: data.to,
            value: data.value,
            fee: data.fee,
            date_created: data.date_created,
            data: data.data,
            sender_public_key: data.sender_public_key,
            transaction_data_hash,
            sender_signature: data.sender_signature,
            mined_in_block_index: None,
            transfer_successful: None,
            is_coinbase: false,
        }
    }

    /// Creates a coinbase transaction carrying the block reward plus
    /// collected fees
    ///
    /// # Arguments
    ///
    /// * `to` - The miner's address
    /// * `value` - The full reward amount
    /// * `block_index` - The index of the block being mined
    /// * `date_created` - Creation timestamp of the mining job
    pub fn coinbase(to: &str, value: u64, block_index: u64, date_created: String) -> Self {
        let transaction_data_hash = compute_data_hash(
            NULL_ADDRESS,
            to,
            value,
            0,
            &date_created,
            Some(COINBASE_DATA),
            NULL_PUBLIC_KEY,
        );

        Transaction {
            from: NULL_ADDRESS.to_string(),
            to: to.to_string(),
            value,
            fee: 0,
            date_created,
            data: Some(COINBASE_DATA.to_string()),
            sender_public_key: NULL_PUBLIC_KEY.to_string(),
            transaction_data_hash,
            sender_signature: null_signature(),
            mined_in_block_index: Some(block_index),
            transfer_successful: Some(true),
            is_coinbase: true,
        }
    }

    /// Recomputes the data hash from the current field values
    pub fn recompute_data_hash(&self) -> String {
        compute_data_hash(
            &self.from,
            &self.to,
            self.value,
            self.fee,
            &self.date_created,
            self.data.as_deref(),
            &self.sender_public_key,
        )
    }

    /// Verifies the sender's signature over the data hash
    ///
    /// Coinbase transactions are synthesized by the ledger itself and
    /// bypass this check entirely.
    pub fn verify_signature(&self) -> bool {
        if self.is_coinbase {
            return true;
        }

        crypto::verify_signature(
            &self.transaction_data_hash,
            &self.sender_public_key,
            &self.sender_signature,
        )
    }

    /// Number of blocks mined on top of (and including) this transaction's
    /// block; zero while still pending
    pub fn confirmations(&self, chain_length: u64) -> u64 {
        self.mined_in_block_index
            .map_or(0, |index| chain_length.saturating_sub(index))
    }
}

fn compute_data_hash(
    from: &str,
    to: &str,
    value: u64,
    fee: u64,
    date_created: &str,
    data: Option<&str>,
    sender_public_key: &str,
) -> String {
    let fields = DataHashFields {
        from,
        to,
        value,
        fee,
        date_created,
        data,
        sender_public_key,
    };

    let json = serde_json::to_string(&fields).unwrap();
    crypto::sha256_hex(json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    fn signed_transaction(wallet: &Wallet, to: &str, value: u64, fee: u64) -> Transaction {
        let mut data = TransactionData {
            from: wallet.address().to_string(),
            to: to.to_string(),
            value,
            fee,
            date_created: "2025-06-01T10:30:00.000Z".to_string(),
            data: None,
            sender_public_key: wallet.public_key_hex().to_string(),
            sender_signature: null_signature(),
        };

        let transaction = Transaction::from_data(data.clone());
        data.sender_signature = wallet.sign(&transaction.transaction_data_hash);
        Transaction::from_data(data)
    }

    #[test]
    fn test_data_hash_is_deterministic() {
        let wallet = Wallet::new().unwrap();
        let first = signed_transaction(&wallet, &"b".repeat(40), 100, 1);
        let second = signed_transaction(&wallet, &"b".repeat(40), 100, 1);

        assert_eq!(first.transaction_data_hash, second.transaction_data_hash);
        assert_eq!(first.transaction_data_hash, first.recompute_data_hash());
        assert_eq!(first.transaction_data_hash.len(), 64);
    }

    #[test]
    fn test_every_field_changes_the_hash() {
        let wallet = Wallet::new().unwrap();
        let base = signed_transaction(&wallet, &"b".repeat(40), 100, 1);

        let mut changed = base.clone();
        changed.value = 101;
        assert_ne!(changed.recompute_data_hash(), base.transaction_data_hash);

        let mut changed = base.clone();
        changed.fee = 2;
        assert_ne!(changed.recompute_data_hash(), base.transaction_data_hash);

        let mut changed = base.clone();
        changed.date_created = "2025-06-01T10:30:00.001Z".to_string();
        assert_ne!(changed.recompute_data_hash(), base.transaction_data_hash);

        let mut changed = base.clone();
        changed.data = Some("memo".to_string());
        assert_ne!(changed.recompute_data_hash(), base.transaction_data_hash);
    }

    #[test]
    fn test_signature_verification() {
        let wallet = Wallet::new().unwrap();
        let transaction = signed_transaction(&wallet, &"b".repeat(40), 100, 1);

        assert!(transaction.verify_signature());

        // A mutated field invalidates the signature against the new hash
        let mut tampered = transaction.clone();
        tampered.value = 999;
        tampered.transaction_data_hash = tampered.recompute_data_hash();
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn test_coinbase_bypasses_signature_check() {
        let coinbase =
            Transaction::coinbase(&"c".repeat(40), 5_000_000, 1, iso_timestamp_now());

        assert!(coinbase.is_coinbase);
        assert_eq!(coinbase.from, NULL_ADDRESS);
        assert_eq!(coinbase.fee, 0);
        assert_eq!(coinbase.mined_in_block_index, Some(1));
        assert_eq!(coinbase.transfer_successful, Some(true));
        assert!(coinbase.verify_signature());
    }

    #[test]
    fn test_wire_field_names() {
        let wallet = Wallet::new().unwrap();
        let transaction = signed_transaction(&wallet, &"b".repeat(40), 100, 1);
        let json = serde_json::to_string(&transaction).unwrap();

        assert!(json.contains("\"dateCreated\""));
        assert!(json.contains("\"senderPublicKey\""));
        assert!(json.contains("\"transactionDataHash\""));
        assert!(json.contains("\"senderSignature\""));
        assert!(json.contains("\"isCoinbase\""));
        // Unset optionals stay off the wire
        assert!(!json.contains("minedInBlockIndex"));
        assert!(!json.contains("transferSuccessful"));
    }

    #[test]
    fn test_iso_timestamp_is_valid() {
        let timestamp = iso_timestamp_now();
        assert!(crate::blockchain::validation::is_valid_date(&timestamp));
        assert!(timestamp.ends_with('Z'));
    }
}
