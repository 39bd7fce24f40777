//! Materials: a shader plus named uniform values
//!
//! ```json
//! {
//!     "name": "default",
//!     "shader": "shaders/default.json",
//!     "values": {
//!         "tint": { "Vec4": [1.0, 1.0, 1.0, 1.0] },
//!         "shininess": { "Float": 32.0 }
//!     }
//! }
//! ```
//!
//! The shader is resolved in `bind`, through the library that first loads
//! the material, and stays alive for as long as the material does.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{
    BindContext, BindError, LoadError, PopulateContext, ReferenceToken, Resource, ResourceError,
    ResourceHandle, ResourceStream,
};

use super::shader::Shader;

/// A value assignable to a shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        Self::Mat4(value)
    }
}

/// On-disk form of a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub name: String,
    /// Path of the shader descriptor in the same assembly
    pub shader: String,
    #[serde(default)]
    pub values: BTreeMap<String, UniformValue>,
}

/// Errors from editing a material
#[derive(Debug, Error)]
pub enum MaterialError {
    /// The shader does not declare the uniform
    #[error("uniform `{uniform}` not found in shader of material `{material}`")]
    UnknownUniform { uniform: String, material: String },

    /// The material has not been bound to a library yet
    #[error("material `{0}` has no shader bound")]
    Unbound(String),

    /// The shader could not be borrowed
    #[error(transparent)]
    Shader(#[from] ResourceError),
}

/// A shader reference plus the uniform values to apply with it
#[derive(Debug, Default)]
pub struct Material {
    name: String,
    shader_path: String,
    values: BTreeMap<String, UniformValue>,
    shader: Option<ReferenceToken<Shader>>,
}

impl Material {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the shader this material uses
    #[must_use]
    pub fn shader_path(&self) -> &str {
        &self.shader_path
    }

    /// The bound shader, `None` before the first bind
    #[must_use]
    pub fn shader(&self) -> Option<ResourceHandle<Shader>> {
        self.shader.as_ref().map(ReferenceToken::handle)
    }

    /// Current value of a uniform
    #[must_use]
    pub fn value(&self, uniform: &str) -> Option<&UniformValue> {
        self.values.get(uniform)
    }

    /// All values by uniform name
    pub fn values(&self) -> impl Iterator<Item = (&str, &UniformValue)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Assign a uniform value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUniform` if the shader does not declare `uniform`, or
    /// `Unbound` before the material has been bound
    pub fn set(&mut self, uniform: &str, value: impl Into<UniformValue>) -> Result<(), MaterialError> {
        let token = self
            .shader
            .as_ref()
            .ok_or_else(|| MaterialError::Unbound(self.name.clone()))?;
        if !token.get()?.has_uniform(uniform) {
            return Err(MaterialError::UnknownUniform {
                uniform: uniform.to_string(),
                material: self.name.clone(),
            });
        }

        self.values.insert(uniform.to_string(), value.into());
        Ok(())
    }

    /// # Errors
    ///
    /// See [`Material::set`]
    pub fn set_int(&mut self, uniform: &str, value: i32) -> Result<(), MaterialError> {
        self.set(uniform, value)
    }

    /// # Errors
    ///
    /// See [`Material::set`]
    pub fn set_float(&mut self, uniform: &str, value: f32) -> Result<(), MaterialError> {
        self.set(uniform, value)
    }

    /// # Errors
    ///
    /// See [`Material::set`]
    pub fn set_vec3(&mut self, uniform: &str, value: Vec3) -> Result<(), MaterialError> {
        self.set(uniform, value)
    }

    /// # Errors
    ///
    /// See [`Material::set`]
    pub fn set_vec4(&mut self, uniform: &str, value: Vec4) -> Result<(), MaterialError> {
        self.set(uniform, value)
    }

    /// # Errors
    ///
    /// See [`Material::set`]
    pub fn set_mat4(&mut self, uniform: &str, value: Mat4) -> Result<(), MaterialError> {
        self.set(uniform, value)
    }
}

impl Resource for Material {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        _ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let text = stream.read_text()?;
        let descriptor: MaterialDescriptor =
            serde_json::from_str(&text).map_err(|e| LoadError::Decode(e.to_string()))?;

        if descriptor.shader.is_empty() {
            return Err(LoadError::Invalid(format!(
                "material `{}` names no shader",
                descriptor.name
            )));
        }

        self.name = descriptor.name;
        self.shader_path = descriptor.shader;
        self.values = descriptor.values;
        Ok(())
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        if self.shader.is_some() {
            return Ok(());
        }

        let token = ctx.acquire::<Shader>(&self.shader_path)?;
        {
            let shader = token
                .get()
                .map_err(|e| BindError::dependency(self.shader_path.as_str(), e))?;
            if let Some(unknown) = self.values.keys().find(|name| !shader.has_uniform(name)) {
                return Err(BindError::UnknownUniform {
                    uniform: unknown.clone(),
                    shader: shader.name().to_string(),
                });
            }
        }

        self.shader = Some(token);
        Ok(())
    }

    fn teardown(&mut self) {
        self.shader = None;
        self.values.clear();
    }
}
