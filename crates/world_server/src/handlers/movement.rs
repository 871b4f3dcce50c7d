use super::{map_fault, WorldTable};
use realm_protocol::packets::MoveUpdate;
use realm_protocol::{ConnectionType, HandlerFault, RegistryError};
use tracing::trace;
use world_sim::Position;

pub fn register(table: &mut WorldTable) -> Result<(), RegistryError> {
    table.register_handler::<MoveUpdate, _>(ConnectionType::Instance, |world, session, packet| {
        let (map, guid) = world.player_map(*session)?;
        let info = packet.info;
        // Clients only move their own character.
        if info.guid != guid.raw() {
            return Err(HandlerFault::new(format!("{session} tried to move {:#x}", info.guid)));
        }
        let position = Position::new(info.x, info.y, info.z).with_orientation(info.orientation);
        let relocation = map.relocate(guid, position).map_err(map_fault)?;
        trace!(%guid, ?relocation, "Player moved");
        Ok(())
    })
}
