//! Vertex format, CPU-side meshes and procedural generators
//!
//! `MeshDesc` is plain data. Uploading it produces a `GpuMesh` stored by the
//! renderer under a `MeshHandle`.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use slotmap::new_key_type;

use crate::foundation::math::Vec3;
use crate::render::resources::BufferHandle;

new_key_type! {
    /// Handle to a mesh uploaded through the renderer
    pub struct MeshHandle;
}

/// Interleaved vertex consumed by every pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Vertex color
    pub color: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Tangent along increasing `u`
    pub tangent: [f32; 3],
}

/// Vertex bindings and attributes handed to pipeline creation
#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    /// Buffer bindings
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Per-location attributes
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

#[allow(clippy::cast_possible_truncation)]
const fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

impl Vertex {
    /// White vertex with no tangent
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            color: [1.0; 3],
            uv,
            tangent: [0.0; 3],
        }
    }

    /// Layout of `Vertex` in binding 0
    #[allow(clippy::cast_possible_truncation)]
    pub fn input_description() -> VertexInputDescription {
        VertexInputDescription {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: size_of::<Self>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
                attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
                attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
                attribute(4, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, tangent)),
            ],
        }
    }
}

/// Index type of every index buffer
pub type Index = u32;

/// Geometry to upload; an empty index list means a non-indexed draw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshDesc {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<Index>,
}

/// One cube face: outward normal plus the in-plane axes, with `u × v == normal`
struct Face {
    normal: [f32; 3],
    u: [f32; 3],
    v: [f32; 3],
}

const CUBE_FACES: [Face; 6] = [
    Face { normal: [0.0, 0.0, 1.0], u: [1.0, 0.0, 0.0], v: [0.0, 1.0, 0.0] },
    Face { normal: [0.0, 0.0, -1.0], u: [-1.0, 0.0, 0.0], v: [0.0, 1.0, 0.0] },
    Face { normal: [1.0, 0.0, 0.0], u: [0.0, 0.0, -1.0], v: [0.0, 1.0, 0.0] },
    Face { normal: [-1.0, 0.0, 0.0], u: [0.0, 0.0, 1.0], v: [0.0, 1.0, 0.0] },
    Face { normal: [0.0, 1.0, 0.0], u: [1.0, 0.0, 0.0], v: [0.0, 0.0, -1.0] },
    Face { normal: [0.0, -1.0, 0.0], u: [1.0, 0.0, 0.0], v: [0.0, 0.0, 1.0] },
];

impl Face {
    /// Corners counter-clockwise seen from outside, with their UVs
    fn corners(&self, half: f32) -> [([f32; 3], [f32; 2]); 4] {
        let n = Vec3::from(self.normal);
        let u = Vec3::from(self.u);
        let v = Vec3::from(self.v);
        let corner = |su: f32, sv: f32| -> [f32; 3] { ((n + u * su + v * sv) * half).into() };
        [
            (corner(-1.0, -1.0), [0.0, 1.0]),
            (corner(1.0, -1.0), [1.0, 1.0]),
            (corner(1.0, 1.0), [1.0, 0.0]),
            (corner(-1.0, 1.0), [0.0, 0.0]),
        ]
    }
}

impl MeshDesc {
    /// Whether the mesh is drawn with an index buffer
    pub fn has_indices(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of elements a draw consumes
    #[allow(clippy::cast_possible_truncation)]
    pub fn draw_count(&self) -> u32 {
        if self.has_indices() {
            self.indices.len() as u32
        } else {
            self.vertices.len() as u32
        }
    }

    /// Single non-indexed triangle facing +Z
    pub fn triangle() -> Self {
        let normal = [0.0, 0.0, 1.0];
        let mut vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
            Vertex::new([0.0, 0.5, 0.0], normal, [0.5, 0.0]),
        ];
        for (vertex, color) in vertices.iter_mut().zip([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]) {
            vertex.color = color;
            vertex.tangent = [1.0, 0.0, 0.0];
        }
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    /// Unit quad facing +Z
    pub fn quad() -> Self {
        let face = &CUBE_FACES[0];
        let vertices = face
            .corners(0.5)
            .into_iter()
            .map(|(mut position, uv)| {
                position[2] = 0.0;
                Vertex {
                    tangent: face.u,
                    ..Vertex::new(position, face.normal, uv)
                }
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Unit cube with four vertices per face
    pub fn cube() -> Self {
        let mut mesh = Self::default();
        for face in &CUBE_FACES {
            let base = Index::try_from(mesh.vertices.len()).unwrap_or(Index::MAX);
            mesh.vertices.extend(face.corners(0.5).into_iter().map(|(position, uv)| Vertex {
                tangent: face.u,
                ..Vertex::new(position, face.normal, uv)
            }));
            mesh.indices
                .extend([0, 1, 2, 2, 3, 0].into_iter().map(|i| base + i));
        }
        mesh
    }

    /// Non-indexed cube seen from inside, for cubemap sampling by position
    pub fn skybox_cube() -> Self {
        let mut vertices = Vec::with_capacity(36);
        for face in &CUBE_FACES {
            let corners = face.corners(1.0);
            let inward = [-face.normal[0], -face.normal[1], -face.normal[2]];
            for i in [0, 2, 1, 2, 0, 3] {
                let (position, uv) = corners[i];
                vertices.push(Vertex::new(position, inward, uv));
            }
        }
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    /// `size` x `size` grid of unit quads on the XZ plane, centered on the origin
    #[allow(clippy::cast_precision_loss)]
    pub fn plane(size: u32) -> Self {
        let size = size.max(1);
        let half = size as f32 / 2.0;
        let row = size + 1;

        let mut vertices = Vec::with_capacity((row * row) as usize);
        for z in 0..row {
            for x in 0..row {
                vertices.push(Vertex {
                    tangent: [1.0, 0.0, 0.0],
                    ..Vertex::new(
                        [x as f32 - half, 0.0, z as f32 - half],
                        [0.0, 1.0, 0.0],
                        [x as f32, z as f32],
                    )
                });
            }
        }

        let mut indices = Vec::with_capacity((size * size * 6) as usize);
        for z in 0..size {
            for x in 0..size {
                let near_left = z * row + x;
                let far_left = (z + 1) * row + x;
                indices.extend([far_left, far_left + 1, near_left + 1, near_left + 1, near_left, far_left]);
            }
        }

        Self { vertices, indices }
    }
}

/// Device-local buffers of an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    /// Vertex buffer
    pub vertex_buffer: BufferHandle,
    /// Index buffer when the mesh is indexed
    pub index_buffer: Option<BufferHandle>,
    /// Elements per draw: indices if indexed, vertices otherwise
    pub draw_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn face_normal(mesh: &MeshDesc, tri: &[u32]) -> Vec3 {
        let p = |i: u32| Vec3::from(mesh.vertices[i as usize].position);
        (p(tri[1]) - p(tri[0])).cross(&(p(tri[2]) - p(tri[0])))
    }

    #[test]
    fn test_vertex_layout() {
        let desc = Vertex::input_description();
        assert_eq!(desc.bindings[0].stride, 56);
        let offsets: Vec<u32> = desc.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36, 44]);
        assert_eq!(desc.attributes[3].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_cube_counts() {
        let cube = MeshDesc::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.has_indices());
        assert_eq!(cube.draw_count(), 36);
    }

    #[test]
    fn test_cube_winds_outward() {
        let cube = MeshDesc::cube();
        for tri in cube.indices.chunks(3) {
            let geometric = face_normal(&cube, tri).normalize();
            let stored = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert_relative_eq!(geometric, stored, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cube_tangents_are_perpendicular() {
        for vertex in MeshDesc::cube().vertices {
            let dot = Vec3::from(vertex.normal).dot(&Vec3::from(vertex.tangent));
            assert_relative_eq!(dot, 0.0);
        }
    }

    #[test]
    fn test_skybox_winds_inward() {
        let skybox = MeshDesc::skybox_cube();
        assert_eq!(skybox.vertices.len(), 36);
        assert!(!skybox.has_indices());
        assert_eq!(skybox.draw_count(), 36);

        let sequential: Vec<u32> = (0..36).collect();
        for tri in sequential.chunks(3) {
            let geometric = face_normal(&skybox, tri);
            let centroid = tri
                .iter()
                .map(|&i| Vec3::from(skybox.vertices[i as usize].position))
                .sum::<Vec3>();
            assert!(geometric.dot(&centroid) < 0.0);
        }
    }

    #[test]
    fn test_plane_grid() {
        let plane = MeshDesc::plane(4);
        assert_eq!(plane.vertices.len(), 25);
        assert_eq!(plane.indices.len(), 4 * 4 * 6);
        assert!(plane.indices.iter().all(|&i| (i as usize) < plane.vertices.len()));

        for tri in plane.indices.chunks(3) {
            assert!(face_normal(&plane, tri).y > 0.0);
        }
        assert_relative_eq!(plane.vertices[0].position[0], -2.0);
    }

    #[test]
    fn test_triangle_and_quad() {
        assert_eq!(MeshDesc::triangle().draw_count(), 3);
        let quad = MeshDesc::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_relative_eq!(face_normal(&quad, &quad.indices[..3]).z, 1.0);
    }
}
