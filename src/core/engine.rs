//! Engine bootstrap
//!
//! Wires the assembly store, the registry and the graphics backend together,
//! and keeps the engine's own library of default assets alive until
//! shutdown.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::assets::{
    AssemblyHandle, AssemblySource, AssemblyStore, DirectorySource, EmbeddedSource, Registry,
    ResourceError, ResourceHandle, ResourceLibrary,
};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::debug::ResourceStats;
use crate::renderer::{FontPackage, GraphicsContext, Material, Shader, Texture2D};

/// Blobs compiled into the binary and served as the engine assembly
fn engine_source() -> EmbeddedSource {
    EmbeddedSource::new()
        .with(
            "textures/missing.png",
            include_bytes!("../../assets/engine/textures/missing.png"),
        )
        .with(
            "shaders/default.json",
            include_bytes!("../../assets/engine/shaders/default.json"),
        )
        .with(
            "shaders/default.vert",
            include_bytes!("../../assets/engine/shaders/default.vert"),
        )
        .with(
            "shaders/default.frag",
            include_bytes!("../../assets/engine/shaders/default.frag"),
        )
        .with(
            "materials/default.json",
            include_bytes!("../../assets/engine/materials/default.json"),
        )
        .with(
            "fonts/default.json",
            include_bytes!("../../assets/engine/fonts/default.json"),
        )
        .with(
            "fonts/default.ttf",
            include_bytes!("../../assets/engine/fonts/default.ttf"),
        )
}

/// Errors that can occur while starting the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Handles to the assets every engine instance loads
#[derive(Debug, Clone)]
pub struct DefaultResources {
    pub missing_texture: ResourceHandle<Texture2D>,
    pub shader: ResourceHandle<Shader>,
    pub material: ResourceHandle<Material>,
    pub fonts: ResourceHandle<FontPackage>,
}

/// Main engine struct
pub struct Engine {
    config: EngineConfig,
    assemblies: AssemblyStore,
    engine_assembly: AssemblyHandle,
    app_assembly: Option<AssemblyHandle>,
    graphics: GraphicsContext,
    stats: Rc<RefCell<ResourceStats>>,
    defaults: DefaultResources,
    /// Reserved library for engine-owned assets; disposed before the
    /// registry shuts down
    library: ResourceLibrary,
    registry: Registry,
}

impl Engine {
    /// Start the engine: register assemblies, create the registry and load
    /// the default assets
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a default asset fails to
    /// load
    pub fn new(config: EngineConfig, graphics: GraphicsContext) -> Result<Self, EngineError> {
        config.validate()?;

        let mut assemblies = AssemblyStore::new();
        let engine_assembly = assemblies.register(&config.engine_assembly, engine_source())?;
        let app_assembly = match &config.asset_dir {
            Some(dir) => Some(assemblies.register(&config.app_assembly, DirectorySource::new(dir))?),
            None => None,
        };

        let registry = Registry::new().with_service(graphics.clone());
        let stats = ResourceStats::observe(&registry);
        if config.log_events {
            registry.subscribe(|event| log::info!("{event}"));
        }

        let mut library = registry.create_library();
        let paths = &config.defaults;
        let defaults = DefaultResources {
            missing_texture: library.load(&engine_assembly, &paths.missing_texture)?,
            shader: library.load(&engine_assembly, &paths.shader)?,
            material: library.load(&engine_assembly, &paths.material)?,
            fonts: library.load(&engine_assembly, &paths.font_package)?,
        };

        log::info!(
            "Engine started with {} assemblies, {} default resources",
            assemblies.len(),
            registry.len()
        );

        Ok(Self {
            config,
            assemblies,
            engine_assembly,
            app_assembly,
            graphics,
            stats,
            defaults,
            library,
            registry,
        })
    }

    /// Create a library with the configured location prefix
    #[must_use]
    pub fn create_library(&self) -> ResourceLibrary {
        self.registry
            .create_library()
            .with_location(self.config.library_location.clone())
    }

    /// Register an additional assembly, e.g. a plugin's bundle
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAssembly` if the name is taken
    pub fn register_assembly(
        &mut self,
        name: &str,
        source: impl AssemblySource + 'static,
    ) -> Result<AssemblyHandle, ResourceError> {
        self.assemblies.register(name, source)
    }

    /// Look up an assembly by name
    ///
    /// # Errors
    ///
    /// Returns `AssemblyNotRegistered` for an unknown name
    pub fn assembly(&self, name: &str) -> Result<AssemblyHandle, ResourceError> {
        self.assemblies.get(name)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn assemblies(&self) -> &AssemblyStore {
        &self.assemblies
    }

    /// The built-in assembly
    #[must_use]
    pub fn engine_assembly(&self) -> &AssemblyHandle {
        &self.engine_assembly
    }

    /// The application assembly, if an asset directory was configured
    #[must_use]
    pub fn app_assembly(&self) -> Option<&AssemblyHandle> {
        self.app_assembly.as_ref()
    }

    #[must_use]
    pub fn graphics(&self) -> &GraphicsContext {
        &self.graphics
    }

    /// The engine's reserved library
    #[must_use]
    pub fn engine_library(&self) -> &ResourceLibrary {
        &self.library
    }

    #[must_use]
    pub fn defaults(&self) -> &DefaultResources {
        &self.defaults
    }

    /// Snapshot of the resource counters
    #[must_use]
    pub fn stats(&self) -> ResourceStats {
        *self.stats.borrow()
    }

    /// Release engine assets and tear down everything still alive.
    /// Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.registry.is_closed() {
            return;
        }

        self.library.dispose();
        let leaked = self.registry.len();
        if leaked > 0 {
            log::warn!("{leaked} resource(s) still referenced at shutdown");
        }
        self.registry.shutdown();
        log::info!("{}", self.stats.borrow().format_stats());
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
