//! Login and logout.

use super::WorldTable;
use realm_protocol::packets::{LogoutRequest, PlayerLogin};
use realm_protocol::{ConnectionType, RegistryError};
use tracing::info;

pub fn register(table: &mut WorldTable) -> Result<(), RegistryError> {
    table.register_handler::<PlayerLogin, _>(ConnectionType::Realm, |world, session, packet| {
        let guid = world.login(*session, packet.character)?;
        info!("🎮 {} entered the world as {}", session, guid);
        Ok(())
    })?;

    table.register_handler::<LogoutRequest, _>(ConnectionType::Realm, |world, session, _packet| {
        world.logout(*session)
    })?;

    Ok(())
}
