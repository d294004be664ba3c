// Recent chats tests
// These tests verify the conversation list built from the full event history

mod common;
use common::*;

use std::sync::Arc;

use anyhow::Result;
use log::info;

use chainpost::crypto;
use chainpost::ledger::reconcile::{ENCRYPTED_PREVIEW, PREVIEW_CHARS};
use chainpost::payload::{KeyRing, Payload};

#[tokio::test]
async fn test_one_summary_per_peer() -> Result<()> {
    setup_logging();
    let (a, b, c, d) = (addr('a'), addr('b'), addr('c'), addr('d'));

    let ledger = Arc::new(
        MockLedger::new()
            .with_event_pages(vec![
                vec![
                    message_event(&a, &b, Some("0x1"), 1000),
                    message_event(&b, &a, Some("0x2"), 3000),
                ],
                vec![
                    message_event(&c, &a, Some("0x3"), 2000),
                    // not involving a
                    message_event(&b, &d, Some("0x4"), 9000),
                    // duplicate delivery
                    message_event(&b, &a, Some("0x2"), 3000),
                ],
            ])
            .with_owned(&a, vec![message_object("0x1", &a, &b, "hi b", 1000)])
            .with_owned(&b, vec![message_object("0x2", &b, &a, "latest from b", 3000)])
            .with_owned(&c, vec![message_object("0x3", &c, &a, "hey from c", 2000)])
            .with_owned(&b, vec![identity_object("0xid-b", Some("Bob"), 0)]),
    );

    let chats = reconciler(ledger.clone()).fetch_recent_chats(&a, &KeyRing::new()).await?;
    info!("Chats: {:?}", chats);

    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].peer_address, b);
    assert_eq!(chats[0].display_name, "Bob");
    assert_eq!(chats[0].last_message_preview, "latest from b");
    assert_eq!(chats[0].last_message_timestamp, 3000);

    assert_eq!(chats[1].peer_address, c);
    assert_eq!(chats[1].display_name, c.short());
    assert_eq!(chats[1].last_message_preview, "hey from c");

    // Only the latest message per peer is fetched
    assert_eq!(ledger.lookups(), 2);
    let looked_up = ledger.looked_up.lock().unwrap().clone();
    assert!(looked_up.contains(&"0x2".to_string()));
    assert!(looked_up.contains(&"0x3".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_recent_chats_are_idempotent() -> Result<()> {
    setup_logging();
    let (a, b, c) = (addr('a'), addr('b'), addr('c'));
    let ledger = Arc::new(
        MockLedger::new()
            .with_events(vec![
                message_event(&a, &b, Some("0x1"), 1000),
                message_event(&a, &c, Some("0x2"), 1000),
            ])
            .with_owned(
                &a,
                vec![
                    message_object("0x1", &a, &b, "to b", 1000),
                    message_object("0x2", &a, &c, "to c", 1000),
                ],
            ),
    );
    let reconciler = reconciler(ledger);
    let keys = KeyRing::new();

    let first = reconciler.fetch_recent_chats(&a, &keys).await?;
    let second = reconciler.fetch_recent_chats(&a, &keys).await?;
    assert_eq!(first, second);

    // equal timestamps are ordered by address
    assert_eq!(first[0].peer_address, b);
    assert_eq!(first[1].peer_address, c);
    Ok(())
}

#[tokio::test]
async fn test_self_messages_are_excluded() -> Result<()> {
    setup_logging();
    let a = addr('a');
    let ledger = Arc::new(
        MockLedger::new()
            .with_events(vec![message_event(&a, &a, Some("0x1"), 1000)])
            .with_owned(&a, vec![message_object("0x1", &a, &a, "note to self", 1000)]),
    );

    let chats = reconciler(ledger).fetch_recent_chats(&a, &KeyRing::new()).await?;
    assert!(chats.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_preview_is_truncated() -> Result<()> {
    setup_logging();
    let (a, b) = (addr('a'), addr('b'));
    let long = "word ".repeat(40);
    let ledger = Arc::new(
        MockLedger::new()
            .with_events(vec![message_event(&b, &a, Some("0x1"), 1000)])
            .with_owned(&b, vec![message_object("0x1", &b, &a, &long, 1000)]),
    );

    let chats = reconciler(ledger).fetch_recent_chats(&a, &KeyRing::new()).await?;
    let preview = &chats[0].last_message_preview;
    assert!(preview.ends_with('…'));
    assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
    Ok(())
}

#[tokio::test]
async fn test_encrypted_preview_without_key() -> Result<()> {
    setup_logging();
    let (a, b) = (addr('a'), addr('b'));
    let key = crypto::SharedKey::from_bytes([4u8; 32]);
    let sealed = Payload::Encrypted(crypto::encrypt_message("hidden", key.as_ref())?).encode();
    let ledger = Arc::new(
        MockLedger::new()
            .with_events(vec![message_event(&b, &a, Some("0x1"), 1000)])
            .with_owned(&b, vec![message_object_bytes("0x1", &b, &a, &sealed, 1000)]),
    );
    let reconciler = reconciler(ledger);

    let chats = reconciler.fetch_recent_chats(&a, &KeyRing::new()).await?;
    assert_eq!(chats[0].last_message_preview, ENCRYPTED_PREVIEW);

    let mut keys = KeyRing::new();
    keys.insert(b.clone(), key);
    let chats = reconciler.fetch_recent_chats(&a, &keys).await?;
    assert_eq!(chats[0].last_message_preview, "hidden");
    Ok(())
}

#[tokio::test]
async fn test_event_without_message_id_has_empty_preview() -> Result<()> {
    setup_logging();
    let (a, b) = (addr('a'), addr('b'));
    let ledger = Arc::new(MockLedger::new().with_events(vec![message_event(&a, &b, None, 1000)]));

    let chats = reconciler(ledger.clone()).fetch_recent_chats(&a, &KeyRing::new()).await?;
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].last_message_preview, "");
    assert_eq!(ledger.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_preview_ignores_object_from_another_conversation() -> Result<()> {
    setup_logging();
    let (a, b, c, d) = (addr('a'), addr('b'), addr('c'), addr('d'));
    let ledger = Arc::new(
        MockLedger::new()
            .with_events(vec![message_event(&a, &b, Some("0x9"), 1000)])
            .with_owned(&c, vec![message_object("0x9", &c, &d, "private c to d", 1000)]),
    );
    let reconciler = reconciler(ledger);
    let keys = KeyRing::new();

    assert!(reconciler.fetch_messages(&a, &b, &keys).await?.is_empty());

    let chats = reconciler.fetch_recent_chats(&a, &keys).await?;
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].peer_address, b);
    assert_eq!(chats[0].last_message_preview, "");
    Ok(())
}
