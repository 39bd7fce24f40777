//! Rendering resources
//!
//! The resource kinds the engine knows how to load, and the backend
//! interface they create native objects through.

mod backend;
mod font;
mod material;
mod mesh;
mod shader;
mod texture;

pub use backend::{
    BackendError, BufferHandle, BufferKind, GraphicsBackend, GraphicsContext, HeadlessBackend,
    ProgramHandle, ShaderStage, TextureDesc, TextureFilter, TextureHandle, TextureWrap,
    UniformInfo,
};
pub use font::{Font, FontEntry, FontFormat, FontPackage};
pub use material::{Material, MaterialDescriptor, MaterialError, UniformValue};
pub use mesh::{Mesh, MeshDescriptor, Vertex};
pub use shader::{Shader, ShaderDescriptor, ShaderSource};
pub use texture::Texture2D;
