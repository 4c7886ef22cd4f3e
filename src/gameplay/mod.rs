pub mod feedback;
pub mod pickups;
pub mod session;
pub mod sfx;
pub mod terrain;
pub mod vehicle;

use bevy::prelude::*;
use feedback::FeedbackGameplayPlugin;
use pickups::PickupGameplayPlugin;
use session::RaceSessionPlugin;
use sfx::GameplaySfxPlugin;
use terrain::TerrainViewPlugin;
use vehicle::VehicleGameplayPlugin;

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RaceSessionPlugin)
            .add_plugins(TerrainViewPlugin)
            .add_plugins(VehicleGameplayPlugin)
            .add_plugins(PickupGameplayPlugin)
            .add_plugins(FeedbackGameplayPlugin)
            .add_plugins(GameplaySfxPlugin);
    }
}
