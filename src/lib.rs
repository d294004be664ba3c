// Client core for on-chain messaging: reconciliation, payload crypto and blob storage
pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod outbox;
pub mod payload;
pub mod preferences;
pub mod storage;

// Re-export main types for convenience
pub use config::ClientConfig;
pub use identity::IdentityResolver;
pub use ledger::reconcile::{EventReconciler, ReconcileError};
pub use ledger::{LedgerClient, LedgerError};
pub use models::*;
pub use storage::{BlobStore, StorageError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trips_through_serde() {
        let address = Address::parse(&format!("0x{}", "ab".repeat(32))).unwrap();
        let json = serde_json::to_string(&address).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);

        assert!(serde_json::from_str::<Address>("\"0x1234\"").is_err());
    }

    #[test]
    fn test_conversation_message_timestamp() {
        let sender = Address::parse(&format!("0x{}", "a".repeat(64))).unwrap();
        let recipient = Address::parse(&format!("0x{}", "b".repeat(64))).unwrap();
        let message = ConversationMessage {
            id: "0x1".to_string(),
            sender,
            recipient,
            content: "hi".to_string(),
            timestamp: millis_to_datetime(1_650_000_000_123),
        };
        assert_eq!(message.timestamp_millis(), 1_650_000_000_123);
    }
}
