//! Resource management for a small game engine
//!
//! This crate provides:
//! - Named assemblies of embedded or on-disk asset blobs
//! - A registry that shares one live instance per asset and counts references
//! - Scoped libraries that release their assets together
//! - Texture, shader, material, font and mesh resource kinds

pub mod assets;
pub mod core;
pub mod renderer;

// Re-exports for convenience
pub use glam;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::assets::{
        AssemblyHandle, AssemblyStore, DirectorySource, EmbeddedSource, ReferenceToken, Registry,
        Resource, ResourceError, ResourceEvent, ResourceEventKind, ResourceHandle, ResourceId,
        ResourceIdentity, ResourceLibrary,
    };
    pub use crate::core::{Engine, EngineConfig, ResourceStats};
    pub use crate::renderer::{
        Font, FontPackage, GraphicsContext, HeadlessBackend, Material, Mesh, MeshDescriptor,
        Shader, Texture2D, UniformValue,
    };
    pub use glam::{Mat4, Vec3, Vec4};
}
