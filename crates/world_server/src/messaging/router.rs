//! Outbound routing of simulation notifications.
//!
//! Maps describe what happened as [`WorldEvent`]s addressed to sessions. This
//! module turns each event into its packet once and hands a copy of the
//! encoded frame to every recipient.

use crate::connection::SessionManager;
use crate::error::SessionError;
use realm_protocol::packets::{
    AttackStart, AttackStop, AttackerStateUpdate, DestroyObject, DuelComplete, DuelOutcome as WireDuelOutcome,
    DuelRequested, EncounterEngageUnit, EncounterState, HighestThreatUpdate, MoveNotify, MovementInfo,
    ThreatClear, ThreatEntry as WireThreatEntry, ThreatRemove, ThreatUpdate,
};
use realm_protocol::{encode_packet, EncodedFrame, ProtocolResult};
use tracing::{debug, error, trace};
use world_sim::{DuelOutcome, Notification, ThreatEntry, WorldEvent};

/// Encodes the packet that carries `event` to a client.
///
/// # Arguments
///
/// * `event` - A notification payload recorded by a map
///
/// # Returns
///
/// The encoded frame, tagged with the instance connection for every
/// in-world event.
pub fn encode_event(event: &WorldEvent) -> ProtocolResult<EncodedFrame> {
    match event {
        WorldEvent::ObjectMoved { guid, position } => encode_packet(&MoveNotify {
            info: MovementInfo {
                guid: guid.raw(),
                x: position.x,
                y: position.y,
                z: position.z,
                orientation: position.orientation,
                ..MovementInfo::default()
            },
        }),
        WorldEvent::ObjectDestroyed { guid, on_death } => encode_packet(&DestroyObject {
            guid: guid.raw(),
            on_death: *on_death,
        }),
        WorldEvent::AttackStarted { attacker, victim } => encode_packet(&AttackStart {
            attacker: attacker.raw(),
            victim: victim.raw(),
        }),
        WorldEvent::AttackStopped {
            attacker,
            victim,
            now_dead,
        } => encode_packet(&AttackStop {
            attacker: attacker.raw(),
            victim: victim.raw(),
            now_dead: *now_dead,
        }),
        WorldEvent::MeleeHit {
            attacker,
            victim,
            damage,
            overkill,
        } => encode_packet(&AttackerStateUpdate {
            attacker: attacker.raw(),
            victim: victim.raw(),
            damage: *damage,
            overkill: *overkill,
        }),
        WorldEvent::ThreatUpdated {
            unit,
            highest_changed,
            entries,
        } => {
            let wire: Vec<WireThreatEntry> = entries.iter().map(wire_threat).collect();
            match (highest_changed, entries.first()) {
                (true, Some(top)) => encode_packet(&HighestThreatUpdate {
                    unit: unit.raw(),
                    highest: top.target.raw(),
                    entries: wire,
                }),
                _ => encode_packet(&ThreatUpdate {
                    unit: unit.raw(),
                    entries: wire,
                }),
            }
        }
        WorldEvent::ThreatCleared { unit } => encode_packet(&ThreatClear { unit: unit.raw() }),
        WorldEvent::ThreatRemoved { unit, about } => encode_packet(&ThreatRemove {
            unit: unit.raw(),
            about: about.raw(),
        }),
        WorldEvent::EncounterStateChanged { boss_id, state } => encode_packet(&EncounterState {
            boss_id: *boss_id,
            state: state.as_u8(),
        }),
        WorldEvent::EncounterUnitEngaged { unit, priority } => encode_packet(&EncounterEngageUnit {
            unit: unit.raw(),
            priority: *priority,
        }),
        WorldEvent::DuelRequested { initiator, target } => encode_packet(&DuelRequested {
            initiator: initiator.raw(),
            target: target.raw(),
        }),
        WorldEvent::DuelFinished {
            initiator,
            target,
            outcome,
        } => encode_packet(&DuelComplete {
            initiator: initiator.raw(),
            target: target.raw(),
            outcome: wire_outcome(*outcome),
        }),
    }
}

// Threat is fractional in the simulation and whole on the wire.
fn wire_threat(entry: &ThreatEntry) -> WireThreatEntry {
    WireThreatEntry {
        target: entry.target.raw(),
        threat: entry.value.max(0.0).round() as u32,
    }
}

fn wire_outcome(outcome: DuelOutcome) -> WireDuelOutcome {
    match outcome {
        DuelOutcome::Started => WireDuelOutcome::Started,
        DuelOutcome::Declined => WireDuelOutcome::Declined,
        DuelOutcome::Expired => WireDuelOutcome::Expired,
        DuelOutcome::Cancelled => WireDuelOutcome::Cancelled,
        DuelOutcome::Won => WireDuelOutcome::Won,
    }
}

/// Delivers a batch of notifications.
///
/// Sessions that disconnected since the event was recorded are skipped;
/// sessions that overflow are closed by the manager. Neither affects the
/// other recipients.
///
/// # Returns
///
/// The number of frames handed to sessions.
pub fn route_notifications(notifications: Vec<Notification>, sessions: &SessionManager) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        if notification.recipients.is_empty() {
            continue;
        }
        let frame = match encode_event(&notification.event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {:?}: {}", notification.event, e);
                continue;
            }
        };
        trace!(opcode = %frame.opcode, recipients = notification.recipients.len(), "Routing notification");

        for recipient in notification.recipients {
            match sessions.send(recipient, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(SessionError::UnknownSession(_)) | Err(SessionError::Closed(_)) => {
                    debug!(session = %recipient, opcode = %frame.opcode, "Recipient gone, frame dropped");
                }
                // Already logged and closed by the manager.
                Err(SessionError::QueueOverflow { .. }) => {}
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AccountInfo;
    use realm_protocol::{decode_response, smsg, ConnectionType, Locale};
    use world_sim::{EncounterState as SimEncounterState, HighGuid, ObjectGuid, SessionId};

    fn creature(counter: u64) -> ObjectGuid {
        ObjectGuid::new(HighGuid::Creature, counter)
    }

    fn player(counter: u64) -> ObjectGuid {
        ObjectGuid::new(HighGuid::Player, counter)
    }

    #[test]
    fn threat_update_reports_highest_only_when_it_changed() {
        let entries = vec![
            ThreatEntry {
                target: player(1),
                value: 12.6,
            },
            ThreatEntry {
                target: player(2),
                value: 3.0,
            },
        ];
        let changed = encode_event(&WorldEvent::ThreatUpdated {
            unit: creature(5),
            highest_changed: true,
            entries: entries.clone(),
        })
        .unwrap();
        assert_eq!(changed.opcode, smsg::HIGHEST_THREAT_UPDATE);
        let packet = decode_response::<HighestThreatUpdate>(changed.payload()).unwrap();
        assert_eq!(packet.highest, player(1).raw());
        assert_eq!(packet.entries[0].threat, 13);

        let same = encode_event(&WorldEvent::ThreatUpdated {
            unit: creature(5),
            highest_changed: false,
            entries,
        })
        .unwrap();
        assert_eq!(same.opcode, smsg::THREAT_UPDATE);
    }

    #[test]
    fn world_events_travel_on_the_instance_connection() {
        let frame = encode_event(&WorldEvent::EncounterStateChanged {
            boss_id: 3,
            state: SimEncounterState::Done,
        })
        .unwrap();
        assert_eq!(frame.connection, ConnectionType::Instance);
        let packet = decode_response::<EncounterState>(frame.payload()).unwrap();
        assert_eq!(packet.state, SimEncounterState::Done.as_u8());
    }

    #[test]
    fn routing_skips_missing_sessions() {
        let sessions = SessionManager::new(8);
        let account = AccountInfo {
            account_id: 1,
            account_name: "a".into(),
            build: 1,
            locale: Locale::EnUs,
        };
        let session = sessions.create_session(account, "127.0.0.1:1".parse().unwrap());

        let delivered = route_notifications(
            vec![Notification {
                recipients: vec![session.id(), SessionId(999)],
                event: WorldEvent::ThreatCleared { unit: creature(1) },
            }],
            &sessions,
        );
        assert_eq!(delivered, 1);
        assert_eq!(session.pending(ConnectionType::Instance), 1);
    }
}
