//! Wire decode vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use bytes::Bytes;

use palaver_core::item::ChatItem;
use palaver_core::registry::ItemRegistry;

mod vector_loader;
use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn decode_vectors() {
    let files = [
        "challenge_ok.json",
        "list_request_ok.json",
        "unsubscribe_ok.json",
        "deprecated_subtype.json",
        "unknown_subtype.json",
        "unknown_service.json",
        "truncated_header.json",
        "truncated_payload.json",
        "bad_version.json",
        "status_bad_utf8.json",
        "list_impossible_count.json",
        "event_bad_kind.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = ItemRegistry::global().decode(Bytes::from(raw));

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let item = res.expect("expected ok item");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(
            item.subtype() as u64,
            ex["subtype"].as_u64().unwrap(),
            "vector={}",
            v.description
        );

        if let Some(code) = ex.get("challenge_code").and_then(|c| c.as_u64()) {
            match &item {
                ChatItem::LobbyChallenge(c) => assert_eq!(c.challenge_code, code),
                other => panic!("vector={}: unexpected item {other:?}", v.description),
            }
        }

        if let Some(lobby) = ex.get("lobby_id").and_then(|c| c.as_u64()) {
            match &item {
                ChatItem::LobbyUnsubscribe(u) => assert_eq!(u.lobby_id, lobby),
                other => panic!("vector={}: unexpected item {other:?}", v.description),
            }
        }
    }
}
