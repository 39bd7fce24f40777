//! Shader programs described by a JSON descriptor
//!
//! ```json
//! {
//!     "name": "unlit",
//!     "source": {
//!         "kind": "Resource",
//!         "vertex": "shaders/unlit.vert",
//!         "fragment": "shaders/unlit.frag"
//!     }
//! }
//! ```
//!
//! `Embedded` carries the GLSL inline, `Resource` names sibling blobs in the
//! same assembly, and `Local` names files on disk.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::assets::{LoadError, PopulateContext, Resource, ResourceStream};

use super::backend::{GraphicsContext, ProgramHandle, UniformInfo};

/// Where the stage sources come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ShaderSource {
    /// GLSL carried in the descriptor itself
    Embedded { vertex: String, fragment: String },
    /// Paths of blobs in the descriptor's own assembly
    Resource { vertex: String, fragment: String },
    /// Filesystem paths
    Local { vertex: PathBuf, fragment: PathBuf },
}

/// On-disk form of a shader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderDescriptor {
    #[serde(default)]
    pub name: String,
    pub source: ShaderSource,
}

/// A linked program and its active uniforms
#[derive(Debug, Default)]
pub struct Shader {
    name: String,
    program: Option<ProgramHandle>,
    uniforms: Vec<UniformInfo>,
    graphics: Option<GraphicsContext>,
}

impl Shader {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the native program, `None` once torn down
    #[must_use]
    pub const fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Active uniforms in location order
    #[must_use]
    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    /// Location of a uniform, if the program declares it
    #[must_use]
    pub fn uniform_location(&self, name: &str) -> Option<i32> {
        self.uniforms
            .iter()
            .find(|uniform| uniform.name == name)
            .map(|uniform| uniform.location)
    }

    /// Check if the program declares `name`
    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform_location(name).is_some()
    }
}

fn read_sources(source: ShaderSource, ctx: &PopulateContext<'_>) -> Result<(String, String), LoadError> {
    match source {
        ShaderSource::Embedded { vertex, fragment } => Ok((vertex, fragment)),
        ShaderSource::Resource { vertex, fragment } => {
            let vertex = ctx.open(&vertex)?.read_text()?;
            let fragment = ctx.open(&fragment)?.read_text()?;
            Ok((vertex, fragment))
        }
        ShaderSource::Local { vertex, fragment } => {
            Ok((fs::read_to_string(vertex)?, fs::read_to_string(fragment)?))
        }
    }
}

impl Resource for Shader {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let text = stream.read_text()?;
        let descriptor: ShaderDescriptor =
            serde_json::from_str(&text).map_err(|e| LoadError::Decode(e.to_string()))?;

        let graphics = ctx.require::<GraphicsContext>()?.clone();
        let (vertex, fragment) = read_sources(descriptor.source, ctx)?;
        let (program, uniforms) = graphics
            .create_program(&vertex, &fragment)
            .map_err(|e| LoadError::Backend(e.to_string()))?;

        self.name = if descriptor.name.is_empty() {
            ctx.identity().path().to_string()
        } else {
            descriptor.name
        };
        self.program = Some(program);
        self.uniforms = uniforms;
        self.graphics = Some(graphics);
        Ok(())
    }

    fn teardown(&mut self) {
        if let (Some(program), Some(graphics)) = (self.program.take(), self.graphics.take()) {
            graphics.delete_program(program);
        }
        self.uniforms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssemblyStore, EmbeddedSource, Registry, ResourceError};
    use crate::renderer::HeadlessBackend;
    use std::rc::Rc;

    const VERTEX: &str = "uniform mat4 mvp;\nvoid main() {}\n";
    const FRAGMENT: &str = "uniform vec4 tint;\nvoid main() {}\n";

    fn descriptor(source: ShaderSource) -> Vec<u8> {
        serde_json::to_vec(&ShaderDescriptor {
            name: "unlit".to_string(),
            source,
        })
        .unwrap()
    }

    fn setup(source: EmbeddedSource) -> (Rc<HeadlessBackend>, Registry, crate::assets::AssemblyHandle) {
        let backend = Rc::new(HeadlessBackend::new());
        let registry = Registry::new().with_service(GraphicsContext::from_rc(backend.clone()));
        let mut store = AssemblyStore::new();
        let assembly = store.register("game", source).unwrap();
        (backend, registry, assembly)
    }

    #[test]
    fn test_descriptor_format() {
        let json = r#"{"name":"x","source":{"kind":"Embedded","vertex":"v","fragment":"f"}}"#;
        let parsed: ShaderDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.source,
            ShaderSource::Embedded {
                vertex: "v".to_string(),
                fragment: "f".to_string()
            }
        );
    }

    #[test]
    fn test_embedded_sources() {
        let blob = descriptor(ShaderSource::Embedded {
            vertex: VERTEX.to_string(),
            fragment: FRAGMENT.to_string(),
        });
        let (backend, registry, assembly) = setup(EmbeddedSource::new().with_bytes("unlit.json", blob));

        let shader = registry.load::<Shader>(&assembly, "unlit.json").unwrap();
        {
            let shader = shader.get().unwrap();
            assert_eq!(shader.name(), "unlit");
            assert_eq!(shader.uniform_location("mvp"), Some(0));
            assert_eq!(shader.uniform_location("tint"), Some(1));
            assert!(!shader.has_uniform("missing"));
        }
        assert_eq!(backend.live_programs(), 1);

        drop(shader);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_resource_sources_read_sibling_blobs() {
        let blob = descriptor(ShaderSource::Resource {
            vertex: "unlit.vert".to_string(),
            fragment: "unlit.frag".to_string(),
        });
        let source = EmbeddedSource::new()
            .with_bytes("unlit.json", blob)
            .with_bytes("unlit.vert", VERTEX)
            .with_bytes("unlit.frag", FRAGMENT);
        let (_backend, registry, assembly) = setup(source);

        let shader = registry.load::<Shader>(&assembly, "unlit.json").unwrap();
        assert_eq!(shader.get().unwrap().uniforms().len(), 2);
    }

    #[test]
    fn test_missing_sibling_fails_load() {
        let blob = descriptor(ShaderSource::Resource {
            vertex: "unlit.vert".to_string(),
            fragment: "gone.frag".to_string(),
        });
        let source = EmbeddedSource::new()
            .with_bytes("unlit.json", blob)
            .with_bytes("unlit.vert", VERTEX);
        let (backend, registry, assembly) = setup(source);

        let err = registry.load::<Shader>(&assembly, "unlit.json").unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Load {
                source: LoadError::Dependency(_),
                ..
            }
        ));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_local_sources() {
        let dir = tempfile::tempdir().unwrap();
        let vertex = dir.path().join("a.vert");
        let fragment = dir.path().join("a.frag");
        fs::write(&vertex, VERTEX).unwrap();
        fs::write(&fragment, FRAGMENT).unwrap();

        let blob = descriptor(ShaderSource::Local { vertex, fragment });
        let (_backend, registry, assembly) = setup(EmbeddedSource::new().with_bytes("a.json", blob));

        let shader = registry.load::<Shader>(&assembly, "a.json").unwrap();
        assert!(shader.get().unwrap().has_uniform("tint"));
    }
}
