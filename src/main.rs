//! Demo walking through the resource lifecycle on a headless backend
//!
//! Run with `RUST_LOG=debug` to see every registry transition.

use std::error::Error;
use std::rc::Rc;

use resource_engine::prelude::*;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_ron(path)?,
        None => EngineConfig::default(),
    };

    let backend = Rc::new(HeadlessBackend::new());
    let mut engine = Engine::new(config, GraphicsContext::from_rc(backend.clone()))?;

    // A procedurally generated mesh, served from memory like a plugin bundle
    let cube = ron::to_string(&MeshDescriptor::cube())?;
    let demo = engine.register_assembly(
        "demo",
        EmbeddedSource::new().with_bytes("meshes/cube.ron", cube),
    )?;

    {
        let engine_assembly = engine.engine_assembly().clone();
        let mut scene = engine.create_library();

        let material = scene.load::<Material>(&engine_assembly, "materials/default.json")?;
        let mesh = scene.load::<Mesh>(&demo, "meshes/cube.ron")?;
        let texture = scene.load::<Texture2D>(&engine_assembly, "textures/missing.png")?;

        {
            let mut material = material.get_mut()?;
            material.set_vec4("tint", Vec4::new(1.0, 0.5, 0.5, 1.0))?;
            log::info!(
                "Material `{}` with {} value(s), shader bound: {}",
                material.name(),
                material.values().count(),
                material.shader().is_some()
            );
        }

        let texture_ref = texture.get()?;
        log::info!(
            "Scene holds {} resource(s): cube with {} indices, {}x{} texture",
            scene.len(),
            mesh.get()?.index_count(),
            texture_ref.width(),
            texture_ref.height()
        );
        log::info!("Texture refcount: {:?}", engine.registry().reference_count(texture.id()));
    }

    // The scene library is gone; only the engine's own assets remain
    log::info!("{}", engine.stats().format_stats());
    log::info!("Live GPU objects: {}", backend.live_objects());

    engine.shutdown();
    log::info!("Live GPU objects after shutdown: {}", backend.live_objects());
    Ok(())
}
