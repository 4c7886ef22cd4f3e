//! Draws the generated ground as triangle strips: a fill curtain down to a
//! floor, a surface band following the ground, and a thin ridge line.

use crate::gameplay::session::RaceSession;
use crate::gameplay::vehicle::{sim_to_world, CameraFollowState};
use crate::sim::terrain::TerrainPoint;
use crate::states::{GameState, RaceSelection};
use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

const SURFACE_BAND_THICKNESS: f32 = 14.0;
const RIDGE_LINE_THICKNESS: f32 = 3.0;
/// Fill extends this far below the lowest point in view.
const FILL_DEPTH_BELOW: f32 = 2_000.0;
const VIEW_MARGIN: f32 = 240.0;
const FILL_Z: f32 = 0.0;
const SURFACE_Z: f32 = 0.5;
const RIDGE_Z: f32 = 0.6;

pub struct TerrainViewPlugin;

impl Plugin for TerrainViewPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(GameState::Playing),
            (cleanup_terrain_view, spawn_terrain_view).chain(),
        )
        .add_systems(OnEnter(GameState::Menu), cleanup_terrain_view)
        .add_systems(
            Update,
            rebuild_visible_terrain.run_if(resource_exists::<RaceSession>),
        );
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
enum TerrainLayer {
    Fill,
    Surface,
    Ridge,
}

/// First point index and point count currently meshed.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
struct VisibleTerrainWindow {
    first_index: usize,
    len: usize,
}

fn spawn_terrain_view(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    selection: Res<RaceSelection>,
) {
    let palette = selection.level.palette();
    commands.insert_resource(ClearColor(rgb(palette.sky_horizon)));
    commands.insert_resource(VisibleTerrainWindow::default());

    for (layer, color, z) in [
        (TerrainLayer::Fill, palette.ground_fill, FILL_Z),
        (TerrainLayer::Surface, palette.ground_surface, SURFACE_Z),
        (TerrainLayer::Ridge, palette.ridge_line, RIDGE_Z),
    ] {
        commands.spawn((
            Name::new(format!("Terrain{layer:?}")),
            layer,
            Mesh2d(meshes.add(empty_mesh())),
            MeshMaterial2d(materials.add(ColorMaterial::from(rgb(color)))),
            Transform::from_xyz(0.0, 0.0, z),
        ));
    }
}

fn cleanup_terrain_view(mut commands: Commands, layer_query: Query<Entity, With<TerrainLayer>>) {
    for entity in &layer_query {
        commands.entity(entity).try_despawn();
    }
    commands.remove_resource::<VisibleTerrainWindow>();
}

fn rebuild_visible_terrain(
    session: Res<RaceSession>,
    follow: Res<CameraFollowState>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    projection_query: Query<&Projection, With<Camera2d>>,
    visible: Option<ResMut<VisibleTerrainWindow>>,
    mut meshes: ResMut<Assets<Mesh>>,
    layer_query: Query<(&TerrainLayer, &Mesh2d)>,
) {
    let Some(mut visible) = visible else {
        return;
    };
    let half_width = visible_half_width(&window_query, &projection_query);
    let center_x = follow.position.x;
    let points = session
        .terrain
        .points_in_range(center_x - half_width - VIEW_MARGIN, center_x + half_width + VIEW_MARGIN);
    if points.len() < 2 {
        return;
    }

    let first_index = session
        .terrain
        .points()
        .partition_point(|point| point.x < points[0].x);
    let window = VisibleTerrainWindow {
        first_index,
        len: points.len(),
    };
    if *visible == window {
        return;
    }
    *visible = window;

    for (layer, mesh_handle) in &layer_query {
        let Some(mesh) = meshes.get_mut(&mesh_handle.0) else {
            continue;
        };
        *mesh = match layer {
            TerrainLayer::Fill => build_ground_fill_mesh(points),
            TerrainLayer::Surface => build_ground_strip_mesh(points, SURFACE_BAND_THICKNESS),
            TerrainLayer::Ridge => build_ground_strip_mesh(points, RIDGE_LINE_THICKNESS),
        };
    }
}

fn visible_half_width(
    window_query: &Query<&Window, With<PrimaryWindow>>,
    projection_query: &Query<&Projection, With<Camera2d>>,
) -> f32 {
    let window_width = window_query
        .single()
        .map(|window| window.width())
        .unwrap_or(1_280.0);
    let scale = match projection_query.single() {
        Ok(Projection::Orthographic(ortho)) => ortho.scale,
        _ => 1.0,
    };
    window_width * 0.5 * scale
}

/// Band of `thickness` hanging below the surface along its normals.
fn build_ground_strip_mesh(points: &[TerrainPoint], thickness: f32) -> Mesh {
    let tops: Vec<Vec2> = points
        .iter()
        .map(|point| sim_to_world(Vec2::new(point.x, point.y)))
        .collect();
    let node_count = tops.len();
    let mut positions = Vec::with_capacity(node_count * 2);
    let mut uvs = Vec::with_capacity(node_count * 2);

    for index in 0..node_count {
        let tangent = if index == 0 {
            tops[1] - tops[0]
        } else if index + 1 == node_count {
            tops[node_count - 1] - tops[node_count - 2]
        } else {
            tops[index + 1] - tops[index - 1]
        };
        let normal = Vec2::new(-tangent.y, tangent.x).normalize_or_zero();
        let safe_normal = if normal.length_squared() <= f32::EPSILON {
            Vec2::Y
        } else {
            normal
        };
        let top = tops[index];
        let bottom = top - safe_normal * thickness;
        positions.push([top.x, top.y, 0.0]);
        positions.push([bottom.x, bottom.y, 0.0]);
        uvs.push([index as f32, 0.0]);
        uvs.push([index as f32, 1.0]);
    }

    strip_mesh(positions, uvs)
}

/// Vertical curtain from the surface down to a flat floor.
fn build_ground_fill_mesh(points: &[TerrainPoint]) -> Mesh {
    let lowest_sim_y = points
        .iter()
        .map(|point| point.y)
        .fold(f32::NEG_INFINITY, f32::max);
    let floor_y = -(lowest_sim_y + FILL_DEPTH_BELOW);

    let mut positions = Vec::with_capacity(points.len() * 2);
    let mut uvs = Vec::with_capacity(points.len() * 2);
    for (index, point) in points.iter().enumerate() {
        let top = sim_to_world(Vec2::new(point.x, point.y));
        positions.push([top.x, top.y, 0.0]);
        positions.push([top.x, floor_y, 0.0]);
        uvs.push([index as f32, 0.0]);
        uvs.push([index as f32, 1.0]);
    }

    strip_mesh(positions, uvs)
}

fn strip_mesh(positions: Vec<[f32; 3]>, uvs: Vec<[f32; 2]>) -> Mesh {
    let node_count = positions.len() / 2;
    let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
    let mut indices = Vec::with_capacity(node_count.saturating_sub(1) * 6);
    for index in 0..node_count.saturating_sub(1) {
        let base = (index * 2) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}

fn empty_mesh() -> Mesh {
    strip_mesh(Vec::new(), Vec::new())
}

fn rgb(color: [f32; 3]) -> Color {
    Color::srgb(color[0], color[1], color[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{LevelTheme, Terrain};

    fn index_count(mesh: &Mesh) -> usize {
        mesh.indices().map(|indices| indices.len()).unwrap_or(0)
    }

    #[test]
    fn strip_has_two_vertices_per_point_and_two_triangles_per_segment() {
        let terrain = Terrain::new(LevelTheme::Grassland, 5);
        let points = terrain.points_in_range(0.0, 600.0);
        let mesh = build_ground_strip_mesh(points, SURFACE_BAND_THICKNESS);

        assert_eq!(mesh.count_vertices(), points.len() * 2);
        assert_eq!(index_count(&mesh), (points.len() - 1) * 6);
    }

    #[test]
    fn band_hangs_below_flat_surface() {
        let terrain = Terrain::new(LevelTheme::Grassland, 5);
        let points = terrain.points_in_range(0.0, 90.0);
        let mesh = build_ground_strip_mesh(points, 10.0);
        let Some(bevy::mesh::VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            panic!("positions should be Float32x3");
        };
        assert!((positions[0][1] - -400.0).abs() < 1e-4);
        assert!((positions[1][1] - -410.0).abs() < 1e-4);
    }

    #[test]
    fn fill_reaches_below_every_point() {
        let mut terrain = Terrain::new(LevelTheme::Snow, 8);
        terrain.ensure_generated(4_000.0);
        let points = terrain.points_in_range(1_000.0, 3_000.0);
        let mesh = build_ground_fill_mesh(points);
        let Some(bevy::mesh::VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            panic!("positions should be Float32x3");
        };
        for pair in positions.chunks(2) {
            assert!(pair[1][1] < pair[0][1]);
        }
    }

    #[test]
    fn empty_mesh_has_no_triangles() {
        assert_eq!(index_count(&empty_mesh()), 0);
    }
}
