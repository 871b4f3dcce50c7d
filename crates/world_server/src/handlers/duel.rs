use super::{map_fault, WorldTable};
use realm_protocol::packets::{DuelProposed, DuelResponse};
use realm_protocol::{ConnectionType, RegistryError};
use world_sim::ObjectGuid;

pub fn register(table: &mut WorldTable) -> Result<(), RegistryError> {
    table.register_handler::<DuelProposed, _>(ConnectionType::Instance, |world, session, packet| {
        let (map, guid) = world.player_map(*session)?;
        map.propose_duel(guid, ObjectGuid(packet.target)).map_err(map_fault)
    })?;

    table.register_handler::<DuelResponse, _>(ConnectionType::Instance, |world, session, packet| {
        let (map, guid) = world.player_map(*session)?;
        map.respond_duel(guid, ObjectGuid(packet.initiator), packet.accepted)
            .map_err(map_fault)
    })?;

    Ok(())
}
