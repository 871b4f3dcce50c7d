//! Melee requests and feign death.
//!
//! Validation of the target (alive, hostile, on the same map) happens in the
//! map; a rejected request only costs the packet.

use super::{map_fault, WorldTable};
use realm_protocol::packets::{AttackStopRequest, AttackSwing, FeignDeath};
use realm_protocol::{ConnectionType, RegistryError};
use world_sim::ObjectGuid;

pub fn register(table: &mut WorldTable) -> Result<(), RegistryError> {
    table.register_handler::<AttackSwing, _>(ConnectionType::Instance, |world, session, packet| {
        let (map, guid) = world.player_map(*session)?;
        map.attack_start(guid, ObjectGuid(packet.victim)).map_err(map_fault)
    })?;

    table.register_handler::<AttackStopRequest, _>(ConnectionType::Instance, |world, session, _packet| {
        let (map, guid) = world.player_map(*session)?;
        map.attack_stop(guid).map_err(map_fault)
    })?;

    table.register_handler::<FeignDeath, _>(ConnectionType::Instance, |world, session, _packet| {
        let (map, guid) = world.player_map(*session)?;
        map.feign_death(guid).map_err(map_fault)
    })?;

    Ok(())
}
