//! Graphics backend interface
//!
//! Resource kinds never talk to a GPU API directly. They fetch a
//! [`GraphicsContext`] from the registry services during `populate` and go
//! through the [`GraphicsBackend`] trait, so the rendering layer can be
//! swapped out (or run headless in tests and tools).

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Native texture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Native shader program name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Native buffer name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Texture sampling filter
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrapping
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureWrap {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// Pixel upload description. Pixels are tightly packed RGBA8.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// An active uniform reported by program linking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub location: i32,
}

/// Buffer binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Failures reported by a graphics backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// A shader stage failed to compile
    #[error("{stage} shader failed to compile: {message}")]
    Compile { stage: ShaderStage, message: String },

    /// The program failed to link
    #[error("program failed to link: {0}")]
    Link(String),

    /// Texture parameters were rejected
    #[error("invalid texture: {0}")]
    InvalidTexture(String),

    /// Buffer parameters were rejected
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),
}

/// The native calls resource kinds need.
///
/// Methods take `&self`; implementations keep their own interior state.
pub trait GraphicsBackend {
    /// Create and upload a 2D texture
    fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<TextureHandle, BackendError>;

    /// Change the sampling parameters of a live texture
    fn set_sampler(&self, texture: TextureHandle, filter: TextureFilter, wrap: TextureWrap);

    /// Delete a texture
    fn delete_texture(&self, texture: TextureHandle);

    /// Compile, link and introspect a program
    fn create_program(
        &self,
        vertex: &str,
        fragment: &str,
    ) -> Result<(ProgramHandle, Vec<UniformInfo>), BackendError>;

    /// Delete a program
    fn delete_program(&self, program: ProgramHandle);

    /// Create and fill a buffer
    fn create_buffer(&self, kind: BufferKind, data: &[u8]) -> Result<BufferHandle, BackendError>;

    /// Delete a buffer
    fn delete_buffer(&self, buffer: BufferHandle);
}

/// Shared backend, installed as a registry service
#[derive(Clone)]
pub struct GraphicsContext(Rc<dyn GraphicsBackend>);

impl GraphicsContext {
    /// Wrap a backend
    pub fn new(backend: impl GraphicsBackend + 'static) -> Self {
        Self(Rc::new(backend))
    }

    /// Wrap an already shared backend
    pub fn from_rc(backend: Rc<dyn GraphicsBackend>) -> Self {
        Self(backend)
    }
}

impl Deref for GraphicsContext {
    type Target = dyn GraphicsBackend;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_name: u32,
    textures: FxHashMap<TextureHandle, (u32, u32)>,
    programs: FxHashMap<ProgramHandle, usize>,
    buffers: FxHashMap<BufferHandle, usize>,
}

impl HeadlessState {
    fn next_name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }
}

/// A backend that validates input and tracks live objects without a GPU.
///
/// Uniforms are discovered by scanning for `uniform <type> <name>;`
/// declarations in both stages.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: RefCell<HeadlessState>,
}

impl HeadlessBackend {
    /// Create a backend with no live objects
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live textures
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Number of live programs
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Number of live buffers
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Total number of live native objects
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.live_textures() + self.live_programs() + self.live_buffers()
    }

    /// Size of a live texture
    #[must_use]
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.state.borrow().textures.get(&texture).copied()
    }
}

fn compile(stage: ShaderStage, source: &str) -> Result<Vec<String>, BackendError> {
    if source.trim().is_empty() {
        return Err(BackendError::Compile {
            stage,
            message: "empty source".to_string(),
        });
    }

    let uniforms = source
        .lines()
        .filter_map(|line| line.trim().strip_prefix("uniform "))
        .filter_map(|decl| decl.split_whitespace().nth(1))
        .map(|name| {
            let name = name.trim_end_matches(';');
            name.split('[').next().unwrap_or(name).to_string()
        })
        .collect();
    Ok(uniforms)
}

impl GraphicsBackend for HeadlessBackend {
    fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<TextureHandle, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidTexture(format!(
                "zero sized texture {}x{}",
                desc.width, desc.height
            )));
        }

        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.pixels.len() != expected {
            return Err(BackendError::InvalidTexture(format!(
                "expected {expected} bytes of RGBA8, got {}",
                desc.pixels.len()
            )));
        }

        let mut state = self.state.borrow_mut();
        let handle = TextureHandle(state.next_name());
        state.textures.insert(handle, (desc.width, desc.height));
        Ok(handle)
    }

    fn set_sampler(&self, texture: TextureHandle, filter: TextureFilter, wrap: TextureWrap) {
        if !self.state.borrow().textures.contains_key(&texture) {
            log::warn!("set_sampler({filter:?}, {wrap:?}) on unknown texture {texture:?}");
        }
    }

    fn delete_texture(&self, texture: TextureHandle) {
        if self.state.borrow_mut().textures.remove(&texture).is_none() {
            log::warn!("Deleted unknown texture {texture:?}");
        }
    }

    fn create_program(
        &self,
        vertex: &str,
        fragment: &str,
    ) -> Result<(ProgramHandle, Vec<UniformInfo>), BackendError> {
        let mut names = compile(ShaderStage::Vertex, vertex)?;
        for name in compile(ShaderStage::Fragment, fragment)? {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let uniforms: Vec<_> = names
            .into_iter()
            .zip(0..)
            .map(|(name, location)| UniformInfo { name, location })
            .collect();

        let mut state = self.state.borrow_mut();
        let handle = ProgramHandle(state.next_name());
        state.programs.insert(handle, uniforms.len());
        Ok((handle, uniforms))
    }

    fn delete_program(&self, program: ProgramHandle) {
        if self.state.borrow_mut().programs.remove(&program).is_none() {
            log::warn!("Deleted unknown program {program:?}");
        }
    }

    fn create_buffer(&self, kind: BufferKind, data: &[u8]) -> Result<BufferHandle, BackendError> {
        if data.is_empty() {
            return Err(BackendError::InvalidBuffer(format!("empty {kind:?} buffer")));
        }

        let mut state = self.state.borrow_mut();
        let handle = BufferHandle(state.next_name());
        state.buffers.insert(handle, data.len());
        Ok(handle)
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        if self.state.borrow_mut().buffers.remove(&buffer).is_none() {
            log::warn!("Deleted unknown buffer {buffer:?}");
        }
    }
}
