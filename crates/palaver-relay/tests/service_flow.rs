//! End-to-end service tests: frames in, forwarded frames and events out.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use bytes::Bytes;

use palaver_core::flags::CHAT_FLAG_LOBBY;
use palaver_core::id::{ChatLobbyId, PeerId};
use palaver_core::item::{
    encode_item, BounceInfo, Bouncing, ChatItem, LobbyDirectoryEntry, LobbyListRequestItem,
    LobbyMsgItem, LobbyUnsubscribeItem,
};
use palaver_core::registry::ItemRegistry;
use palaver_core::sign::KeySignature;
use palaver_relay::bounce::unix_now;
use palaver_relay::config::RelayConfig;
use palaver_relay::event::ChatEvent;
use palaver_relay::identity::{introduce, IdentityDirectory, MemoryIdentity};
use palaver_relay::membership::ChallengeDisposition;
use palaver_relay::service::ChatService;

const LOBBY: ChatLobbyId = 42;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn peer(b: u8) -> PeerId {
    PeerId::from_bytes([b; 16])
}

fn entry() -> LobbyDirectoryEntry {
    LobbyDirectoryEntry {
        lobby_id: LOBBY,
        name: "test".into(),
        topic: String::new(),
        member_count: 0,
        flags: 0,
    }
}

fn admit(service: &ChatService, local: &MemoryIdentity, remote: &MemoryIdentity, p: PeerId) {
    local.bind_peer(p, remote.local_signer());
    local.add_known(remote.local_signer(), remote.local_verifying_key());
    let challenge = service.membership.begin_challenge(LOBBY, p).unwrap();
    let answer = remote.answer_challenge(challenge.challenge_code);
    assert_eq!(
        service.membership.on_challenge_code(p, answer),
        ChallengeDisposition::Answered { lobby: LOBBY }
    );
    service.membership.promote_forwarding(LOBBY, p).unwrap();
}

fn signed_msg(author: &MemoryIdentity, msg_id: u64, text: &str) -> LobbyMsgItem {
    let mut item = LobbyMsgItem {
        bounce: BounceInfo {
            lobby_id: LOBBY,
            msg_id,
            nick: author.local_nick(),
            signature: KeySignature {
                signer: author.local_signer(),
                bytes: vec![],
            },
        },
        parent_msg_id: 0,
        flags: CHAT_FLAG_LOBBY,
        send_time: unix_now(),
        message: text.into(),
    };
    item.bounce.signature = author.sign(&item.signed_bytes().unwrap()).unwrap();
    item
}

#[tokio::test]
async fn lobby_message_is_forwarded_verbatim_and_deduped() {
    init_tracing();
    let local = Arc::new(MemoryIdentity::generate("local"));
    let (service, mut events) = ChatService::new(&RelayConfig::default(), local.clone());
    service.create_lobby(entry());

    let bob = MemoryIdentity::generate("bob");
    let carol = MemoryIdentity::generate("carol");
    let pb = peer(0xB);
    let pc = peer(0xC);
    let mut rx_b = service.attach_peer(pb);
    let mut rx_c = service.attach_peer(pc);
    admit(&service, &local, &bob, pb);
    admit(&service, &local, &carol, pc);

    let frame = encode_item(&ChatItem::LobbyMsg(signed_msg(&bob, 1, "hi"))).unwrap();
    service.handle_incoming(pb, frame.clone()).await.unwrap();

    // Forwarded to carol with the identical bytes; never back to bob.
    let forwarded = rx_c.try_recv().unwrap();
    assert_eq!(forwarded.bytes, frame);
    assert!(rx_b.try_recv().is_err());

    // Carol rebroadcasts the same frame: duplicate, nothing moves.
    service.handle_incoming(pc, frame.clone()).await.unwrap();
    assert!(rx_b.try_recv().is_err());
    assert!(rx_c.try_recv().is_err());

    // Exactly one delivery to the application.
    match events.try_recv().unwrap() {
        ChatEvent::LobbyMessage { lobby, msg } => {
            assert_eq!(lobby, LOBBY);
            assert_eq!(msg.text, "hi");
            assert_eq!(msg.nick, "bob");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn list_request_is_answered_with_directory() {
    let local = Arc::new(MemoryIdentity::generate("local"));
    let (service, _events) = ChatService::new(&RelayConfig::default(), local);
    service.create_lobby(entry());

    let pb = peer(1);
    let mut rx_b = service.attach_peer(pb);

    let frame = encode_item(&ChatItem::LobbyListRequest(LobbyListRequestItem)).unwrap();
    service.handle_incoming(pb, frame).await.unwrap();

    let reply = rx_b.try_recv().unwrap();
    match ItemRegistry::global().decode(reply.bytes).unwrap() {
        ChatItem::LobbyList(list) => {
            assert_eq!(list.lobbies.len(), 1);
            assert_eq!(list.lobbies[0].lobby_id, LOBBY);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn inbound_challenge_is_answered_on_the_wire() {
    let local = Arc::new(MemoryIdentity::generate("local"));
    let (service, _events) = ChatService::new(&RelayConfig::default(), local.clone());
    service.create_lobby(entry());

    let pb = peer(2);
    let mut rx_b = service.attach_peer(pb);

    let frame = encode_item(&ChatItem::LobbyChallenge(
        palaver_core::item::LobbyChallengeItem {
            challenge_code: 0x1234,
        },
    ))
    .unwrap();
    service.handle_incoming(pb, frame).await.unwrap();

    let reply = rx_b.try_recv().unwrap();
    match ItemRegistry::global().decode(reply.bytes).unwrap() {
        ChatItem::LobbyChallenge(ch) => {
            assert_eq!(ch.challenge_code, local.answer_challenge(0x1234));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn unsubscribe_frame_stops_forwarding() {
    let local = Arc::new(MemoryIdentity::generate("local"));
    let (service, _events) = ChatService::new(&RelayConfig::default(), local.clone());
    service.create_lobby(entry());

    let bob = MemoryIdentity::generate("bob");
    let pb = peer(3);
    let mut rx_b = service.attach_peer(pb);
    admit(&service, &local, &bob, pb);

    let frame = encode_item(&ChatItem::LobbyUnsubscribe(LobbyUnsubscribeItem {
        lobby_id: LOBBY,
    }))
    .unwrap();
    service.handle_incoming(pb, frame).await.unwrap();

    // A locally originated message now has nobody to go to.
    let outcome = service.send_lobby_message(LOBBY, "anyone?", 0, 0).unwrap();
    assert!(!matches!(
        outcome,
        palaver_relay::bounce::IngestOutcome::AcceptedForward { .. }
    ));
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn junk_frames_error_without_corrupting_state() {
    let local = Arc::new(MemoryIdentity::generate("local"));
    let (service, _events) = ChatService::new(&RelayConfig::default(), local.clone());
    service.create_lobby(entry());

    let pb = peer(4);
    let _rx_b = service.attach_peer(pb);

    assert!(service
        .handle_incoming(pb, Bytes::from_static(&[0x02, 0x0C]))
        .await
        .is_err());

    // The service still works afterwards.
    let bob = MemoryIdentity::generate("bob");
    admit(&service, &local, &bob, pb);
    let frame = encode_item(&ChatItem::LobbyMsg(signed_msg(&bob, 8, "still alive"))).unwrap();
    service.handle_incoming(pb, frame).await.unwrap();
    assert!(service.bounce.msg_seen(LOBBY, 8));
}

#[tokio::test]
async fn distant_handshake_completes_across_two_services() {
    init_tracing();
    let a_id = Arc::new(MemoryIdentity::generate("alice"));
    let b_id = Arc::new(MemoryIdentity::generate("bob"));
    introduce(&a_id, &b_id);

    let (sa, _ea) = ChatService::new(&RelayConfig::default(), a_id);
    let (sb, mut eb) = ChatService::new(&RelayConfig::default(), b_id);

    let pa = peer(0xA);
    let pb = peer(0xB);
    let mut a_out = sa.attach_peer(pb);
    let mut b_out = sb.attach_peer(pa);

    const SESSION: u64 = 7;
    sa.initiate_distant(pb, SESSION).unwrap();
    let a_key = a_out.try_recv().unwrap().bytes;

    // Relay path delivers alice's key into bob's tunnel endpoint.
    sb.handle_incoming_distant(pa, SESSION, a_key).await.unwrap();
    let b_key = b_out.try_recv().unwrap().bytes;
    match eb.try_recv().unwrap() {
        ChatEvent::DistantKeyReady { session } => assert_eq!(session, SESSION),
        other => panic!("unexpected event {other:?}"),
    }

    sa.handle_incoming_distant(pb, SESSION, b_key).await.unwrap();

    let secret_a = sa.distant.take_shared_secret(SESSION).unwrap();
    let secret_b = sb.distant.take_shared_secret(SESSION).unwrap();
    assert_eq!(secret_a.as_bytes(), secret_b.as_bytes());
}
