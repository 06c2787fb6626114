//! Encode/decode round-trips for every concrete item type, including
//! boundary values: empty strings, zero-length sequences, and maximum
//! flag combinations.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::Bytes;

use palaver_core::flags::{
    CHAT_FLAG_CUSTOM_STATE, CHAT_FLAG_LOBBY, CHAT_FLAG_PRIVATE, CHAT_FLAG_PUBLIC,
    LOBBY_FLAG_CHALLENGE_REQUIRED, LOBBY_FLAG_PUBLIC, MSG_CONFIG_FLAG_INCOMING,
};
use palaver_core::id::{PeerId, SignerId};
use palaver_core::item::{
    encode_item, BounceInfo, ChatAvatarItem, ChatItem, ChatMsgItem, ChatStatusItem,
    DhPublicKeyItem, LobbyChallengeItem, LobbyConfigItem, LobbyDirectoryEntry, LobbyEventItem,
    LobbyEventKind, LobbyInviteItem, LobbyListItem, LobbyListRequestItem, LobbyMsgItem,
    LobbyUnsubscribeItem, PrivateChatMsgConfigItem, SignerKey, HEADER_LEN,
};
use palaver_core::registry::ItemRegistry;
use palaver_core::sign::KeySignature;

fn assert_roundtrip(item: ChatItem) {
    let frame = encode_item(&item).unwrap();
    assert_eq!(
        frame.len(),
        HEADER_LEN + item.payload_len(),
        "declared size must match encoded size"
    );
    let decoded = ItemRegistry::global().decode(frame).unwrap();
    assert_eq!(decoded, item);
}

fn sig(fill: u8) -> KeySignature {
    KeySignature {
        signer: SignerId::from_bytes([fill; 16]),
        bytes: vec![fill; 64],
    }
}

#[test]
fn chat_msg_roundtrip() {
    assert_roundtrip(ChatItem::Msg(ChatMsgItem {
        flags: CHAT_FLAG_PRIVATE | CHAT_FLAG_PUBLIC,
        send_time: 1_700_000_000,
        message: "hello there".into(),
        recv_time: 0,
    }));
}

#[test]
fn chat_msg_boundary_values() {
    // empty message, all flag bits set
    assert_roundtrip(ChatItem::Msg(ChatMsgItem {
        flags: u32::MAX,
        send_time: u64::MAX,
        message: String::new(),
        recv_time: 0,
    }));
}

#[test]
fn recv_time_is_local_metadata() {
    let item = ChatMsgItem {
        flags: 1,
        send_time: 5,
        message: "x".into(),
        recv_time: 999,
    };
    let frame = encode_item(&ChatItem::Msg(item.clone())).unwrap();
    let decoded = ItemRegistry::global().decode(frame).unwrap();
    // decodes equal even though recv_time was never on the wire
    assert_eq!(decoded, ChatItem::Msg(item));
}

#[test]
fn chat_status_roundtrip() {
    assert_roundtrip(ChatItem::Status(ChatStatusItem {
        flags: CHAT_FLAG_CUSTOM_STATE,
        status: "gone fishing".into(),
    }));
    assert_roundtrip(ChatItem::Status(ChatStatusItem {
        flags: 0,
        status: String::new(),
    }));
}

#[test]
fn avatar_roundtrip() {
    assert_roundtrip(ChatItem::Avatar(ChatAvatarItem {
        image: Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47]),
    }));
    // zero-length image
    assert_roundtrip(ChatItem::Avatar(ChatAvatarItem {
        image: Bytes::new(),
    }));
}

#[test]
fn private_msg_config_roundtrip() {
    assert_roundtrip(ChatItem::PrivateMsgConfig(PrivateChatMsgConfigItem {
        peer: PeerId::from_bytes([3; 16]),
        flags: CHAT_FLAG_PRIVATE,
        config_flags: MSG_CONFIG_FLAG_INCOMING,
        send_time: 1_650_000_000,
        message: "stored line".into(),
        recv_time: 1_650_000_009,
    }));
}

#[test]
fn lobby_challenge_roundtrip() {
    assert_roundtrip(ChatItem::LobbyChallenge(LobbyChallengeItem {
        challenge_code: u64::MAX,
    }));
}

#[test]
fn lobby_unsubscribe_roundtrip() {
    assert_roundtrip(ChatItem::LobbyUnsubscribe(LobbyUnsubscribeItem {
        lobby_id: 42,
    }));
}

#[test]
fn lobby_list_request_roundtrip() {
    assert_roundtrip(ChatItem::LobbyListRequest(LobbyListRequestItem));
}

#[test]
fn lobby_list_roundtrip() {
    assert_roundtrip(ChatItem::LobbyList(LobbyListItem {
        lobbies: vec![
            LobbyDirectoryEntry {
                lobby_id: 1,
                name: "rust".into(),
                topic: "systems chat".into(),
                member_count: 12,
                flags: LOBBY_FLAG_PUBLIC,
            },
            LobbyDirectoryEntry {
                lobby_id: 2,
                name: String::new(),
                topic: String::new(),
                member_count: 0,
                flags: u32::MAX,
            },
        ],
    }));
    // zero-length sequence
    assert_roundtrip(ChatItem::LobbyList(LobbyListItem { lobbies: vec![] }));
}

#[test]
fn lobby_invite_roundtrip() {
    assert_roundtrip(ChatItem::LobbyInvite(LobbyInviteItem {
        lobby_id: 99,
        lobby_name: "ops".into(),
        lobby_topic: "on-call".into(),
        lobby_flags: LOBBY_FLAG_PUBLIC | LOBBY_FLAG_CHALLENGE_REQUIRED,
    }));
}

#[test]
fn lobby_config_roundtrip() {
    assert_roundtrip(ChatItem::LobbyConfig(LobbyConfigItem {
        lobby_id: 7,
        flags: LOBBY_FLAG_CHALLENGE_REQUIRED,
    }));
}

#[test]
fn lobby_msg_roundtrip() {
    assert_roundtrip(ChatItem::LobbyMsg(LobbyMsgItem {
        bounce: BounceInfo {
            lobby_id: 42,
            msg_id: 1,
            nick: "alice".into(),
            signature: sig(0x5A),
        },
        parent_msg_id: 0,
        flags: CHAT_FLAG_LOBBY,
        send_time: 1_700_000_123,
        message: "hi".into(),
    }));
}

#[test]
fn lobby_event_roundtrip() {
    assert_roundtrip(ChatItem::LobbyEvent(LobbyEventItem {
        bounce: BounceInfo {
            lobby_id: 42,
            msg_id: 2,
            nick: "bob".into(),
            signature: sig(0x21),
        },
        event: LobbyEventKind::PeerJoined,
        detail: "bob".into(),
        send_time: 1_700_000_124,
    }));
}

#[test]
fn dh_public_key_roundtrip() {
    assert_roundtrip(ChatItem::DhPublicKey(DhPublicKeyItem {
        public_value: vec![0x42; 32],
        signature: sig(0x10),
        signer_key: SignerKey {
            signer: SignerId::from_bytes([0x10; 16]),
            key: vec![0x77; 32],
        },
    }));
}
