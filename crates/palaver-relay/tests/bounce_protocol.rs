//! Bounce protocol integration tests: dedup, signature gate, staleness,
//! threading, eviction.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use palaver_core::flags::CHAT_FLAG_LOBBY;
use palaver_core::id::{ChatLobbyId, ChatLobbyMsgId, PeerId};
use palaver_core::item::{
    BounceInfo, Bouncing, LobbyEventItem, LobbyEventKind, LobbyMsgItem,
};
use palaver_core::sign::KeySignature;
use palaver_relay::bounce::{unix_now, BounceProtocol, IngestOutcome};
use palaver_relay::config::BounceSection;
use palaver_relay::identity::{IdentityDirectory, MemoryIdentity};
use palaver_relay::membership::{ChallengeDisposition, MembershipTable};
use palaver_relay::obs::RelayMetrics;

const LOBBY: ChatLobbyId = 42;

struct Node {
    identity: Arc<MemoryIdentity>,
    membership: Arc<MembershipTable>,
    bounce: Arc<BounceProtocol>,
}

fn node() -> Node {
    let identity = Arc::new(MemoryIdentity::generate("local"));
    let membership = Arc::new(MembershipTable::new(identity.clone()));
    let bounce = Arc::new(BounceProtocol::new(
        &BounceSection::default(),
        identity.clone(),
        membership.clone(),
        Arc::new(RelayMetrics::new()),
    ));
    bounce.join_lobby(LOBBY);
    membership.announce_lobby(palaver_core::item::LobbyDirectoryEntry {
        lobby_id: LOBBY,
        name: "test".into(),
        topic: "".into(),
        member_count: 0,
        flags: 0,
    });
    Node {
        identity,
        membership,
        bounce,
    }
}

/// Run a remote identity through the challenge flow until it forwards.
fn admit(node: &Node, remote: &MemoryIdentity, peer: PeerId) {
    node.identity.bind_peer(peer, remote.local_signer());
    node.identity
        .add_known(remote.local_signer(), remote.local_verifying_key());
    let challenge = node.membership.begin_challenge(LOBBY, peer).unwrap();
    let answer = remote.answer_challenge(challenge.challenge_code);
    assert_eq!(
        node.membership.on_challenge_code(peer, answer),
        ChallengeDisposition::Answered { lobby: LOBBY }
    );
    node.membership.promote_forwarding(LOBBY, peer).unwrap();
}

fn signed_msg(
    author: &MemoryIdentity,
    msg_id: ChatLobbyMsgId,
    parent: ChatLobbyMsgId,
    text: &str,
) -> LobbyMsgItem {
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
        parent_msg_id: parent,
        flags: CHAT_FLAG_LOBBY,
        send_time: unix_now(),
        message: text.into(),
    };
    item.bounce.signature = author.sign(&item.signed_bytes().unwrap()).unwrap();
    item
}

fn signed_event(author: &MemoryIdentity, msg_id: ChatLobbyMsgId, send_time: u64) -> LobbyEventItem {
    let mut item = LobbyEventItem {
        bounce: BounceInfo {
            lobby_id: LOBBY,
            msg_id,
            nick: author.local_nick(),
            signature: KeySignature {
                signer: author.local_signer(),
                bytes: vec![],
            },
        },
        event: LobbyEventKind::PeerJoined,
        detail: author.local_nick(),
        send_time,
    };
    item.bounce.signature = author.sign(&item.signed_bytes().unwrap()).unwrap();
    item
}

fn peer(b: u8) -> PeerId {
    PeerId::from_bytes([b; 16])
}

#[test]
fn lobby_42_scenario() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    let pa = peer(0xA);
    let pb = peer(0xB);
    admit(&n, &alice, pa);
    let bob = MemoryIdentity::generate("bob");
    admit(&n, &bob, pb);

    // Peer A sends msg 1: accepted, forwarded to everyone but A.
    let hi = signed_msg(&alice, 1, 0, "hi");
    let outcome = n.bounce.ingest_msg(&hi, Some(pa));
    assert_eq!(
        outcome,
        IngestOutcome::AcceptedForward { targets: vec![pb] }
    );

    // Peer B rebroadcasts the identical item: duplicate, no forward.
    assert_eq!(
        n.bounce.ingest_msg(&hi, Some(pb)),
        IngestOutcome::DuplicateDropped
    );

    // Peer A replies under msg 1: accepted and linked.
    let reply = signed_msg(&alice, 2, 1, "reply");
    assert!(n.bounce.ingest_msg(&reply, Some(pa)).accepted());
    assert_eq!(n.bounce.thread_children(LOBBY, 1), vec![2]);

    let history = n.bounce.history(LOBBY);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "hi");
    assert_eq!(history[1].parent_msg_id, 1);
}

#[test]
fn dedup_is_idempotent_across_arrival_order() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    let pa = peer(1);
    let pb = peer(2);
    admit(&n, &alice, pa);
    let bob = MemoryIdentity::generate("bob");
    admit(&n, &bob, pb);

    let item = signed_msg(&alice, 77, 0, "once");
    let first = n.bounce.ingest_msg(&item, Some(pb));
    let second = n.bounce.ingest_msg(&item, Some(pa));
    assert!(first.accepted());
    assert_eq!(second, IngestOutcome::DuplicateDropped);
}

#[test]
fn invalid_signature_is_dropped_and_never_cached() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    n.identity
        .add_known(alice.local_signer(), alice.local_verifying_key());

    // Tamper one payload byte after signing.
    let mut forged = signed_msg(&alice, 5, 0, "legit");
    forged.message = "lfgit".into();

    assert_eq!(
        n.bounce.ingest_msg(&forged, Some(peer(1))),
        IngestOutcome::SignatureInvalid
    );
    // The poisoned copy must not occupy the msg_id.
    assert!(!n.bounce.msg_seen(LOBBY, 5));

    // The real message with the same msg_id still goes through.
    let real = signed_msg(&alice, 5, 0, "legit");
    assert!(n.bounce.ingest_msg(&real, Some(peer(1))).accepted());
    assert!(n.bounce.msg_seen(LOBBY, 5));
}

#[test]
fn unknown_signer_is_signature_invalid() {
    let n = node();
    let stranger = MemoryIdentity::generate("stranger");
    let item = signed_msg(&stranger, 9, 0, "who dis");
    assert_eq!(
        n.bounce.ingest_msg(&item, Some(peer(1))),
        IngestOutcome::SignatureInvalid
    );
}

#[test]
fn stale_event_is_dropped_even_when_novel() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    n.identity
        .add_known(alice.local_signer(), alice.local_verifying_key());

    // Default horizon is 600 s; a day-old event is stale.
    let stale = signed_event(&alice, 100, unix_now().saturating_sub(86_400));
    assert_eq!(
        n.bounce.ingest_event(&stale, Some(peer(1))),
        IngestOutcome::StaleDropped
    );

    // Stale events are not cached: a fresh event may reuse the id.
    let fresh = signed_event(&alice, 100, unix_now());
    assert!(n.bounce.ingest_event(&fresh, Some(peer(1))).accepted());
}

#[test]
fn unknown_parent_is_accepted_but_unlinked() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    n.identity
        .add_known(alice.local_signer(), alice.local_verifying_key());

    let orphan = signed_msg(&alice, 3, 999, "orphan");
    assert!(n.bounce.ingest_msg(&orphan, Some(peer(1))).accepted());
    assert!(n.bounce.thread_children(LOBBY, 999).is_empty());
    assert_eq!(n.bounce.history(LOBBY).len(), 1);
}

#[test]
fn unserved_lobby_and_bad_items_are_malformed() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    n.identity
        .add_known(alice.local_signer(), alice.local_verifying_key());

    let mut foreign = signed_msg(&alice, 1, 0, "hi");
    foreign.bounce.lobby_id = 777;
    assert_eq!(
        n.bounce.ingest_msg(&foreign, Some(peer(1))),
        IngestOutcome::Malformed
    );

    let mut anon = signed_msg(&alice, 2, 0, "hi");
    anon.bounce.nick = String::new();
    assert_eq!(
        n.bounce.ingest_msg(&anon, Some(peer(1))),
        IngestOutcome::Malformed
    );

    // Default cap is 4096 bytes of text.
    let huge = signed_msg(&alice, 3, 0, &"x".repeat(5000));
    assert_eq!(
        n.bounce.ingest_msg(&huge, Some(peer(1))),
        IngestOutcome::Malformed
    );
}

#[test]
fn eviction_reopens_msg_ids_past_retention() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    n.identity
        .add_known(alice.local_signer(), alice.local_verifying_key());

    let item = signed_msg(&alice, 50, 0, "short lived");
    let t0 = Instant::now();
    assert!(n.bounce.ingest_msg_at(&item, Some(peer(1)), t0).accepted());
    assert!(n.bounce.msg_seen(LOBBY, 50));

    // Within retention nothing is evicted.
    n.bounce.evict(t0 + Duration::from_secs(10));
    assert!(n.bounce.msg_seen(LOBBY, 50));

    // Past the default 600 s window the entry goes away and the id is
    // acceptable again.
    n.bounce.evict(t0 + Duration::from_secs(601));
    assert!(!n.bounce.msg_seen(LOBBY, 50));
    assert!(n.bounce.ingest_msg(&item, Some(peer(1))).accepted());
}

#[test]
fn local_send_self_ingests_and_links_replies() {
    let n = node();
    let (root, outcome) = n
        .bounce
        .send_message(LOBBY, "first", 0, CHAT_FLAG_LOBBY)
        .unwrap();
    assert_eq!(outcome, IngestOutcome::AcceptedNoForward);
    assert!(n.bounce.msg_seen(LOBBY, root.bounce.msg_id));

    let (reply, _) = n
        .bounce
        .send_message(LOBBY, "second", root.bounce.msg_id, CHAT_FLAG_LOBBY)
        .unwrap();
    assert_eq!(
        n.bounce.thread_children(LOBBY, root.bounce.msg_id),
        vec![reply.bounce.msg_id]
    );
}

#[test]
fn forward_set_excludes_local_origin_peer_only() {
    let n = node();
    let alice = MemoryIdentity::generate("alice");
    let pa = peer(0x11);
    admit(&n, &alice, pa);

    // Locally originated messages go to every forwarding member.
    let (_, outcome) = n.bounce.send_message(LOBBY, "hello all", 0, 0).unwrap();
    assert_eq!(outcome, IngestOutcome::AcceptedForward { targets: vec![pa] });
}
