//! Procedural mesh builders for the skybox, the tiled room and the wave grids.

use crate::constants::{WATER_HEIGHT_FACTOR, WAVE_CELL_SIZE, WAVE_HALF_EXTENT};
use crate::mesh::{MeshData, Vertex};

/// Per-quad UV rectangle shared by the room faces and every wave cell.
const QUAD_UVS: [[f32; 2]; 4] = [[1.0, 1.0], [0.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

/// Two triangles per quad with base vertex `b`: (b+1, b, b+3), (b+3, b+2, b+1).
fn quad_indices(base: u32) -> [u32; 6] {
    [base + 1, base, base + 3, base + 3, base + 2, base + 1]
}

#[rustfmt::skip]
const SKYBOX_POSITIONS: [[f32; 3]; 36] = [
    [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0],
    [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0],

    [-1.0, -1.0,  1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0],
    [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0],

    [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
    [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],

    [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0],
    [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],

    [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0],
    [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0],

    [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0],
    [ 1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0],
];

/// Unit cube as 36 unindexed positions (sequential indices).
pub fn skybox_cube() -> MeshData {
    let vertices = SKYBOX_POSITIONS.iter().map(|&p| Vertex::position_only(p)).collect();
    let indices = (0..SKYBOX_POSITIONS.len() as u32).collect();
    MeshData::new(vertices, indices)
}

// Room faces in order: back, left, front, right, down. The top is left open.
#[rustfmt::skip]
const ROOM_FACES: [([[f32; 3]; 4], [f32; 3]); 5] = [
    ([[ 1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0]], [ 0.0,  0.0, -1.0]),
    ([[ 1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0]], [ 1.0,  0.0,  0.0]),
    ([[-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0]], [ 0.0,  0.0,  1.0]),
    ([[-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0]], [-1.0,  0.0,  0.0]),
    ([[-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0], [-1.0, -1.0, -1.0]], [ 0.0, -1.0,  0.0]),
];

/// Open-topped box: 20 vertices, 30 indices, one normal per face.
pub fn tiled_room() -> MeshData {
    let mut vertices = Vec::with_capacity(ROOM_FACES.len() * 4);
    let mut indices = Vec::with_capacity(ROOM_FACES.len() * 6);

    for (face, (corners, normal)) in ROOM_FACES.iter().enumerate() {
        for (corner, uv) in corners.iter().zip(QUAD_UVS.iter()) {
            vertices.push(Vertex::new(*corner, *normal, *uv));
        }
        indices.extend_from_slice(&quad_indices(face as u32 * 4));
    }

    MeshData::new(vertices, indices)
}

#[rustfmt::skip]
const CUBE_TOP: ([[f32; 3]; 4], [f32; 3]) =
    ([[-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0]], [ 0.0,  1.0,  0.0]);

/// Closed unit cube with per-face normals, for world objects.
pub fn solid_cube() -> MeshData {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (face, (corners, normal)) in ROOM_FACES.iter().chain(std::iter::once(&CUBE_TOP)).enumerate() {
        for (corner, uv) in corners.iter().zip(QUAD_UVS.iter()) {
            vertices.push(Vertex::new(*corner, *normal, *uv));
        }
        indices.extend_from_slice(&quad_indices(face as u32 * 4));
    }

    MeshData::new(vertices, indices)
}

/// Shape of a flat wave grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    pub cell_size: f32,
    pub half_extent: f32,
    pub height: f32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            cell_size: WAVE_CELL_SIZE,
            half_extent: WAVE_HALF_EXTENT,
            height: WATER_HEIGHT_FACTOR,
        }
    }
}

impl GridSpec {
    /// Cells along each axis, `floor(2E / s)`.
    pub fn cells_per_side(&self) -> u32 {
        if self.cell_size <= 0.0 || self.half_extent <= 0.0 {
            return 0;
        }
        (2.0 * self.half_extent / self.cell_size).floor() as u32
    }

    pub fn cell_count(&self) -> usize {
        let side = self.cells_per_side() as usize;
        side * side
    }

    pub fn vertex_count(&self) -> usize {
        self.cell_count() * 4
    }

    pub fn index_count(&self) -> usize {
        self.cell_count() * 6
    }
}

/// Grid of independent quads at a fixed height. Vertices are not shared
/// between cells so every quad can be shaded and displaced on its own.
pub fn wave_grid(spec: &GridSpec) -> MeshData {
    let width = spec.cells_per_side();
    let cells = spec.cell_count();
    let s = spec.cell_size;
    let e = spec.half_extent;
    let y = spec.height;
    let up = [0.0, 1.0, 0.0];

    let mut vertices = Vec::with_capacity(cells * 4);
    let mut indices = Vec::with_capacity(cells * 6);

    for cell in 0..cells as u32 {
        let w = (cell % width) as f32;
        let h = (cell / width) as f32;

        let x0 = w * s - e + s;
        let z0 = h * s - e + s;
        let x1 = x0 - s;
        let z1 = z0 - s;

        let corners = [[x0, y, z0], [x1, y, z0], [x1, y, z1], [x0, y, z1]];
        for (corner, uv) in corners.iter().zip(QUAD_UVS.iter()) {
            vertices.push(Vertex::new(*corner, up, *uv));
        }
        indices.extend_from_slice(&quad_indices(cell * 4));
    }

    MeshData::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skybox_has_36_positions() {
        let sky = skybox_cube();
        assert_eq!(sky.vertex_count(), 36);
        assert_eq!(sky.index_count(), 36);
        assert!(sky.vertices.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn room_is_five_faces_without_a_top() {
        let room = tiled_room();
        assert_eq!(room.vertex_count(), 20);
        assert_eq!(room.index_count(), 30);
        assert!(room.indices_in_bounds());
        assert!(room.vertices.iter().all(|v| v.normal != [0.0, 1.0, 0.0]));
        assert_eq!(&room.indices[..6], &[1, 0, 3, 3, 2, 1]);
        assert_eq!(&room.indices[24..], &[17, 16, 19, 19, 18, 17]);
    }

    #[test]
    fn solid_cube_closes_the_room() {
        let cube = solid_cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.indices_in_bounds());
        assert_eq!(cube.vertices.iter().filter(|v| v.normal == [0.0, 1.0, 0.0]).count(), 4);
    }

    #[test]
    fn default_grid_is_200_by_200() {
        let spec = GridSpec::default();
        assert_eq!(spec.cells_per_side(), 200);
        let grid = wave_grid(&spec);
        assert_eq!(grid.vertex_count(), 200 * 200 * 4);
        assert_eq!(grid.index_count(), 200 * 200 * 6);
        assert_eq!(*grid.indices.iter().max().unwrap(), 200 * 200 * 4 - 1);
    }

    #[test]
    fn first_cell_matches_layout() {
        let grid = wave_grid(&GridSpec {
            cell_size: 0.5,
            half_extent: 1.0,
            height: 0.6,
        });
        let v: Vec<[f32; 3]> = grid.vertices[..4].iter().map(|v| v.position).collect();
        assert_eq!(
            v,
            vec![
                [-0.5, 0.6, -0.5],
                [-1.0, 0.6, -0.5],
                [-1.0, 0.6, -1.0],
                [-0.5, 0.6, -1.0],
            ]
        );
        let uvs: Vec<[f32; 2]> = grid.vertices[..4].iter().map(|v| v.uv).collect();
        assert_eq!(uvs, QUAD_UVS.to_vec());
        assert_eq!(&grid.indices[6..12], &[5, 4, 7, 7, 6, 5]);
    }

    #[test]
    fn degenerate_grid_produces_empty_mesh() {
        let grid = wave_grid(&GridSpec {
            cell_size: 0.0,
            half_extent: 1.0,
            height: 0.0,
        });
        assert_eq!(grid.vertex_count(), 0);
        assert_eq!(grid.index_count(), 0);
    }
}
