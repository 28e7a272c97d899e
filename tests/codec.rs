//! Team channel and wire parsing through the public API.

use zappy_ai::cipher::{decode, derive_key, encode, encode_at, CodecError, NIBBLE_ALPHABET};
use zappy_ai::jobs::{pick_weighted, total_weight, JobKind, TeamMessage};
use zappy_ai::protocol::{
    parse_broadcast, parse_inventory, parse_look, players_on, BroadcastError,
};
use zappy_ai::types::Resource;

#[test]
fn teammates_read_each_other_and_rivals_do_not() {
    let ours = derive_key("foo");
    let theirs = derive_key("bar");

    let envelope = encode(7, 3, b"evolve", &ours).unwrap();
    assert!(envelope.bytes().all(|b| NIBBLE_ALPHABET.contains(&b)));

    let message = decode(&envelope, &ours).unwrap();
    assert_eq!(message.sender_id, 7);
    assert_eq!(message.counter, 3);
    assert_eq!(message.content, "evolve");

    // The checksum covers the ciphertext, so a rival key gets past it and
    // trips on the text instead.
    assert_eq!(decode(&envelope, &theirs), Err(CodecError::InvalidText));
}

#[test]
fn tampered_envelopes_are_rejected() {
    let key = derive_key("foo");
    let envelope = encode_at(1, 0, b"assign_job 1 basic", &key, 1_700_000_000).unwrap();

    let mut tampered = envelope.into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'I' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();
    assert_eq!(decode(&tampered, &key), Err(CodecError::ChecksumMismatch));

    assert!(decode("AIO", &key).is_err());
    assert!(decode("hello world", &key).is_err());
}

#[test]
fn look_and_inventory_replies_parse() {
    let tiles = parse_look("[player food, linemate, , player player sibur]");
    assert_eq!(tiles.len(), 4);
    assert_eq!(players_on(&tiles[0]), 1);
    assert!(tiles[2].is_empty());
    assert_eq!(players_on(&tiles[3]), 2);

    let inventory = parse_inventory("[food 12, linemate 1, sibur 3, unobtainium 9]").unwrap();
    assert_eq!(inventory.get(Resource::Food), 12);
    assert_eq!(inventory.get(Resource::Sibur), 3);
    assert_eq!(inventory.get(Resource::Thystame), 0);
    assert!(parse_inventory("ko").is_none());
}

#[test]
fn broadcast_lines_split_direction_from_content() {
    assert_eq!(
        parse_broadcast("message 5, \"AIOU\""),
        Ok((5, "AIOU".to_string()))
    );
    assert_eq!(parse_broadcast("message 0, hi"), Ok((0, "hi".to_string())));
    assert!(matches!(
        parse_broadcast("message x, hi"),
        Err(BroadcastError::BadDirection(_))
    ));
    assert_eq!(
        parse_broadcast("message 300, hi"),
        Err(BroadcastError::DirectionOutOfRange(300))
    );
    assert_eq!(parse_broadcast("ok"), Err(BroadcastError::NotABroadcast));
}

#[test]
fn team_verbs_survive_a_round_through_text() {
    let order = TeamMessage::parse("assign_job 12 garbler");
    assert_eq!(
        order,
        TeamMessage::AssignJob {
            player_id: 12,
            job: JobKind::Garbler
        }
    );
    assert_eq!(order.to_string(), "assign_job 12 garbler");
    assert_eq!(
        TeamMessage::parse("something else entirely"),
        TeamMessage::Other("something else entirely".into())
    );
}

#[test]
fn weighted_pick_covers_every_mode() {
    let modes = [('r', 50), ('m', 40), ('p', 10)];
    let total = total_weight(&modes);
    let picks: Vec<char> = (1..=total)
        .filter_map(|draw| pick_weighted(&modes, draw).copied())
        .collect();
    assert_eq!(picks.iter().filter(|c| **c == 'r').count(), 50);
    assert_eq!(picks.iter().filter(|c| **c == 'm').count(), 40);
    assert_eq!(picks.iter().filter(|c| **c == 'p').count(), 10);
    assert_eq!(pick_weighted(&modes, total + 1), None);
}
