//! 2D textures decoded from image blobs
//!
//! Supports PNG, JPEG and BMP through the `image` crate. Pixels are
//! converted to RGBA8 and uploaded through the graphics backend during
//! populate; the CPU copy is not kept.

use crate::assets::{LoadError, PopulateContext, Resource, ResourceStream};

use super::backend::{GraphicsContext, TextureDesc, TextureFilter, TextureHandle, TextureWrap};

/// A GPU texture loaded from an assembly blob
#[derive(Debug, Default)]
pub struct Texture2D {
    width: u32,
    height: u32,
    filter: TextureFilter,
    wrap: TextureWrap,
    handle: Option<TextureHandle>,
    graphics: Option<GraphicsContext>,
}

impl Texture2D {
    /// Get texture width
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Get texture height
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Get the native texture, `None` once torn down
    #[must_use]
    pub const fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    #[must_use]
    pub const fn filter(&self) -> TextureFilter {
        self.filter
    }

    #[must_use]
    pub const fn wrap(&self) -> TextureWrap {
        self.wrap
    }

    /// Change the sampling filter
    pub fn set_filter(&mut self, filter: TextureFilter) {
        self.filter = filter;
        self.apply_sampler();
    }

    /// Change the coordinate wrapping
    pub fn set_wrap(&mut self, wrap: TextureWrap) {
        self.wrap = wrap;
        self.apply_sampler();
    }

    fn apply_sampler(&self) {
        if let (Some(handle), Some(graphics)) = (self.handle, &self.graphics) {
            graphics.set_sampler(handle, self.filter, self.wrap);
        }
    }
}

impl Resource for Texture2D {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let bytes = stream.read_all()?;
        let img = image::load_from_memory(&bytes).map_err(|e| LoadError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let graphics = ctx.require::<GraphicsContext>()?.clone();
        let handle = graphics
            .create_texture(&TextureDesc {
                width,
                height,
                pixels: rgba.as_raw(),
                filter: self.filter,
                wrap: self.wrap,
            })
            .map_err(|e| LoadError::Backend(e.to_string()))?;

        self.width = width;
        self.height = height;
        self.handle = Some(handle);
        self.graphics = Some(graphics);
        Ok(())
    }

    fn teardown(&mut self) {
        if let (Some(handle), Some(graphics)) = (self.handle.take(), self.graphics.take()) {
            graphics.delete_texture(handle);
        }
    }
}
