//! Meshes loaded from RON descriptors
//!
//! A descriptor lists vertices and a triangle-list index buffer. Both are
//! validated and uploaded as backend buffers during populate.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::assets::{LoadError, PopulateContext, Resource, ResourceStream};

use super::backend::{BufferHandle, BufferKind, GraphicsContext};

/// Vertex with position, normal, and UV coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// On-disk form of a mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshDescriptor {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshDescriptor {
    /// A unit cube centered at origin
    pub fn cube() -> Self {
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            // Front
            ([0.0, 0.0, 1.0], [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]]),
            // Back
            ([0.0, 0.0, -1.0], [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]]),
            // Top
            ([0.0, 1.0, 0.0], [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]]),
            // Bottom
            ([0.0, -1.0, 0.0], [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]]),
            // Right
            ([1.0, 0.0, 0.0], [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]]),
            // Left
            ([-1.0, 0.0, 0.0], [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]]),
        ];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut descriptor = Self::default();
        for (normal, corners) in faces {
            let base = descriptor.vertices.len() as u32;
            for (position, uv) in corners.into_iter().zip(uvs) {
                descriptor.vertices.push(Vertex::new(position, normal, uv));
            }
            descriptor
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        descriptor
    }

    /// A plane on the XZ axis
    pub fn plane(size: f32) -> Self {
        let half = size / 2.0;
        let up = [0.0, 1.0, 0.0];
        Self {
            vertices: vec![
                Vertex::new([-half, 0.0, half], up, [0.0, 0.0]),
                Vertex::new([half, 0.0, half], up, [1.0, 0.0]),
                Vertex::new([half, 0.0, -half], up, [1.0, 1.0]),
                Vertex::new([-half, 0.0, -half], up, [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Check that the indices form a triangle list over the vertices
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Invalid` describing the first problem found
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.vertices.is_empty() {
            return Err(LoadError::Invalid("mesh has no vertices".to_string()));
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(LoadError::Invalid(format!(
                "{} indices do not form a triangle list",
                self.indices.len()
            )));
        }
        if let Some(index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= self.vertices.len())
        {
            return Err(LoadError::Invalid(format!(
                "index {index} out of range for {} vertices",
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// A mesh uploaded as vertex and index buffers
#[derive(Debug, Default)]
pub struct Mesh {
    vertex_count: usize,
    index_count: usize,
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    graphics: Option<GraphicsContext>,
}

impl Mesh {
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Get the number of indices
    #[must_use]
    pub const fn index_count(&self) -> usize {
        self.index_count
    }

    /// Check if the mesh is uploaded
    #[must_use]
    pub const fn is_uploaded(&self) -> bool {
        self.vertex_buffer.is_some() && self.index_buffer.is_some()
    }
}

impl Resource for Mesh {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let text = stream.read_text()?;
        let descriptor: MeshDescriptor =
            ron::from_str(&text).map_err(|e| LoadError::Decode(e.to_string()))?;
        descriptor.validate()?;

        let graphics = ctx.require::<GraphicsContext>()?.clone();
        let vertex_buffer = graphics
            .create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&descriptor.vertices))
            .map_err(|e| LoadError::Backend(e.to_string()))?;
        let index_buffer = match graphics
            .create_buffer(BufferKind::Index, bytemuck::cast_slice(&descriptor.indices))
        {
            Ok(buffer) => buffer,
            Err(e) => {
                graphics.delete_buffer(vertex_buffer);
                return Err(LoadError::Backend(e.to_string()));
            }
        };

        self.vertex_count = descriptor.vertices.len();
        self.index_count = descriptor.indices.len();
        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.graphics = Some(graphics);
        Ok(())
    }

    fn teardown(&mut self) {
        let Some(graphics) = self.graphics.take() else {
            return;
        };
        if let Some(buffer) = self.vertex_buffer.take() {
            graphics.delete_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            graphics.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssemblyStore, EmbeddedSource, Registry, ResourceError};
    use crate::renderer::HeadlessBackend;
    use std::rc::Rc;

    #[test]
    fn test_generated_shapes_are_valid() {
        let cube = MeshDescriptor::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        cube.validate().unwrap();
        MeshDescriptor::plane(2.0).validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let mut mesh = MeshDescriptor::plane(1.0);
        mesh.indices.push(0);
        assert!(matches!(mesh.validate(), Err(LoadError::Invalid(_))));

        let mut mesh = MeshDescriptor::plane(1.0);
        mesh.indices[4] = 9;
        assert!(matches!(mesh.validate(), Err(LoadError::Invalid(_))));

        assert!(MeshDescriptor::default().validate().is_err());
    }

    #[test]
    fn test_load_uploads_two_buffers() {
        let backend = Rc::new(HeadlessBackend::new());
        let registry = Registry::new().with_service(GraphicsContext::from_rc(backend.clone()));
        let text = ron::to_string(&MeshDescriptor::cube()).unwrap();
        let mut store = AssemblyStore::new();
        let assembly = store
            .register("game", EmbeddedSource::new().with_bytes("cube.ron", text))
            .unwrap();

        let cube = registry.load::<Mesh>(&assembly, "cube.ron").unwrap();
        assert!(cube.get().unwrap().is_uploaded());
        assert_eq!(cube.get().unwrap().index_count(), 36);
        assert_eq!(backend.live_buffers(), 2);

        drop(cube);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_invalid_mesh_uploads_nothing() {
        let backend = Rc::new(HeadlessBackend::new());
        let registry = Registry::new().with_service(GraphicsContext::from_rc(backend.clone()));
        let mut broken = MeshDescriptor::plane(1.0);
        broken.indices.truncate(4);
        let text = ron::to_string(&broken).unwrap();
        let mut store = AssemblyStore::new();
        let assembly = store
            .register("game", EmbeddedSource::new().with_bytes("broken.ron", text))
            .unwrap();

        assert!(matches!(
            registry.load::<Mesh>(&assembly, "broken.ron"),
            Err(ResourceError::Load {
                source: LoadError::Invalid(_),
                ..
            })
        ));
        assert_eq!(backend.live_buffers(), 0);
    }
}
