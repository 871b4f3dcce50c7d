//! Frame to handler dispatch through the opcode table.

use realm_protocol::packets::{AttackSwing, DuelResponse, MoveNotify, MoveUpdate, MovementFlags, Pong};
use realm_protocol::{
    cmsg, encode_packet, encode_request, ConnectionType, Direction, Frame, HandlerFault, Opcode,
    OpcodeTable, ProtocolError, RegistryError, DEFAULT_MAX_FRAME_SIZE,
};

#[derive(Default)]
struct World {
    log: Vec<String>,
}

type Table = OpcodeTable<World, &'static str>;

fn build_table() -> Table {
    let mut table = Table::new();
    table
        .register_handler::<AttackSwing, _>(ConnectionType::Instance, |world, session, packet| {
            world.log.push(format!("{session} swings at {}", packet.victim));
            Ok(())
        })
        .unwrap();
    table
        .register_handler::<DuelResponse, _>(ConnectionType::Instance, |world, session, packet| {
            if !packet.accepted {
                return Err(HandlerFault::new("declined"));
            }
            world.log.push(format!("{session} accepts {}", packet.initiator));
            Ok(())
        })
        .unwrap();
    table
        .register_handler::<MoveUpdate, _>(ConnectionType::Instance, |world, session, packet| {
            world.log.push(format!("{session} moved to {}", packet.info.x));
            Ok(())
        })
        .unwrap();
    table.register_server::<Pong>().unwrap();
    table.register_server::<MoveNotify>().unwrap();
    table
}

fn to_frame(bytes: &[u8]) -> Frame {
    let (frame, used) = Frame::split(bytes, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
    assert_eq!(used, bytes.len());
    frame
}

#[test]
fn frame_round_trip_reaches_handler() {
    let table = build_table();
    let encoded = encode_request(&AttackSwing { victim: 99 }, ConnectionType::Instance).unwrap();

    let job = table
        .decode(to_frame(&encoded.bytes), ConnectionType::Instance, "alice")
        .unwrap();
    let mut world = World::default();
    job(&mut world).unwrap();

    assert_eq!(world.log, vec!["alice swings at 99".to_string()]);
}

#[test]
fn unknown_opcode_is_dropped_and_stream_continues() {
    let table = build_table();
    let mut world = World::default();

    let unknown = Frame::new(Opcode(0x0777), vec![1, 2, 3]);
    let err = table.decode(unknown, ConnectionType::Instance, "bob").err().unwrap();
    assert!(matches!(err, ProtocolError::UnknownOpcode { .. }));
    assert!(!err.is_fatal());

    let next = encode_request(&AttackSwing { victim: 5 }, ConnectionType::Instance).unwrap();
    let job = table
        .decode(to_frame(&next.bytes), ConnectionType::Instance, "bob")
        .unwrap();
    job(&mut world).unwrap();
    assert_eq!(world.log.len(), 1);
}

#[test]
fn truncated_payload_is_fatal() {
    let table = build_table();
    let frame = Frame::new(cmsg::ATTACK_SWING, vec![1, 2, 3]);
    let err = table.decode(frame, ConnectionType::Instance, "carol").err().unwrap();
    assert!(matches!(err, ProtocolError::Truncated { needed: 8, available: 3, .. }));
    assert!(err.is_fatal());
}

#[test]
fn trailing_bytes_are_tolerated() {
    let table = build_table();
    let mut payload = 7u64.to_le_bytes().to_vec();
    payload.extend_from_slice(&[0xAA, 0xBB]);
    let job = table
        .decode(Frame::new(cmsg::ATTACK_SWING, payload), ConnectionType::Instance, "dave")
        .unwrap();
    let mut world = World::default();
    job(&mut world).unwrap();
    assert_eq!(world.log, vec!["dave swings at 7".to_string()]);
}

#[test]
fn handler_fault_is_returned_to_caller() {
    let table = build_table();
    let encoded = encode_request(
        &DuelResponse {
            initiator: 3,
            accepted: false,
        },
        ConnectionType::Instance,
    )
    .unwrap();
    let job = table
        .decode(to_frame(&encoded.bytes), ConnectionType::Instance, "erin")
        .unwrap();
    let mut world = World::default();
    assert_eq!(job(&mut world), Err(HandlerFault::new("declined")));
    assert!(world.log.is_empty());
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut table = build_table();
    let err = table
        .register_handler::<AttackSwing, _>(ConnectionType::Realm, |_, _, _| Ok(()))
        .unwrap_err();
    let RegistryError::Duplicate {
        opcode, direction, ..
    } = err;
    assert_eq!(opcode, cmsg::ATTACK_SWING);
    assert_eq!(direction, Direction::ClientToServer);

    assert!(table.register_server::<Pong>().is_err());
    assert!(table.is_registered(cmsg::MOVE_UPDATE, Direction::ClientToServer));
    assert_eq!(table.client_opcodes(), 3);
}

#[test]
fn server_packets_carry_their_connection() {
    let table = build_table();
    let notify = MoveNotify::default();
    let frame = encode_packet(&notify).unwrap();
    assert_eq!(frame.connection, ConnectionType::Instance);
    assert_eq!(table.server_connection(frame.opcode), Some(ConnectionType::Instance));

    let pong = encode_packet(&Pong { serial: 1 }).unwrap();
    assert_eq!(pong.connection, ConnectionType::Realm);
}

#[test]
fn extended_movement_dispatches() {
    let table = build_table();
    let mut update = MoveUpdate::default();
    update.info.flags = MovementFlags::Extended {
        flags: MovementFlags::FORWARD,
        flags2: 1,
    };
    update.info.x = 12.5;
    let encoded = encode_request(&update, ConnectionType::Instance).unwrap();
    let job = table
        .decode(to_frame(&encoded.bytes), ConnectionType::Instance, "finn")
        .unwrap();
    let mut world = World::default();
    job(&mut world).unwrap();
    assert_eq!(world.log, vec!["finn moved to 12.5".to_string()]);
}
