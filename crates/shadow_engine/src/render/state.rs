//! Render state published to, and shared between, render passes
//!
//! [`ShadowStateSet`] is what receivers consume: texture bindings, texture
//! coordinate generators and uniforms. [`CastingState`] is what casters are
//! drawn with. Attribute objects are deduplicated through a [`StateCache`]
//! owned by the application, so equal attributes share one allocation no
//! matter how many views or engines request them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::render::backend::{CompareFunc, ProgramHandle, TextureHandle};

/// Which polygon faces are culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFaceMode {
    /// Cull front faces
    Front,
}

/// A fixed-function state attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateAttribute {
    /// Face culling; `None` disables culling
    CullFace(Option<CullFaceMode>),
    /// Depth offset applied while rasterising
    PolygonOffset {
        /// Slope-scaled factor
        factor: f32,
        /// Constant units
        units: f32,
    },
    /// Depth test and write
    Depth {
        /// Comparison
        func: CompareFunc,
        /// Depth writes enabled
        write: bool,
    },
    /// Clamp rather than clip geometry outside the depth range
    DepthClamp(bool),
}

/// Hashable identity of a [`StateAttribute`]; floats compare bitwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AttributeKey {
    CullFace(Option<CullFaceMode>),
    PolygonOffset(u32, u32),
    Depth(CompareFunc, bool),
    DepthClamp(bool),
}

impl StateAttribute {
    fn key(&self) -> AttributeKey {
        match *self {
            Self::CullFace(mode) => AttributeKey::CullFace(mode),
            Self::PolygonOffset { factor, units } => AttributeKey::PolygonOffset(factor.to_bits(), units.to_bits()),
            Self::Depth { func, write } => AttributeKey::Depth(func, write),
            Self::DepthClamp(on) => AttributeKey::DepthClamp(on),
        }
    }

    /// Same kind of attribute, regardless of value
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Deduplicating cache of shared state attributes
#[derive(Debug, Default)]
pub struct StateCache {
    entries: Mutex<HashMap<AttributeKey, Arc<StateAttribute>>>,
}

impl StateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared instance equal to `attribute`, inserting it if new
    pub fn share(&self, attribute: StateAttribute) -> Arc<StateAttribute> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(attribute.key()).or_insert_with(|| Arc::new(attribute)))
    }

    /// Number of distinct attributes held
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries nobody else references any more
    pub fn prune(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, attr| Arc::strong_count(attr) > 1);
    }
}

/// Uniform names shared with the receiver shaders
pub mod uniform_names {
    /// Sampler of the base (diffuse) texture
    pub const BASE_TEXTURE: &str = "baseTexture";
    /// Unit of the base texture
    pub const BASE_TEXTURE_UNIT: &str = "baseTextureUnit";
    /// Distance beyond which nothing is shadowed
    pub const MAXIMUM_SHADOW_MAP_DISTANCE: &str = "maximumShadowMapDistance";
    /// Distance at which shadows start fading out
    pub const SHADOW_FADE_START: &str = "shadowFadeStart";

    /// Sampler of the `index`th shadow map
    pub fn shadow_texture(index: u32) -> String {
        format!("shadowTexture{index}")
    }

    /// Texture unit of the `index`th shadow map
    pub fn shadow_texture_unit(index: u32) -> String {
        format!("shadowTextureUnit{index}")
    }

    /// Main-eye to shadow-clip matrix of the `index`th shadow map
    pub fn valid_region_matrix(index: u32) -> String {
        format!("validRegionMatrix{index}")
    }
}

/// Value of a uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Integer or sampler
    Int(i32),
    /// Scalar
    Float(f32),
    /// Column-major 4x4 matrix
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Narrow a double-precision matrix for upload
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_mat4(m: &Mat4) -> Self {
        let mut out = [0.0_f32; 16];
        for (dst, src) in out.iter_mut().zip(m.iter()) {
            *dst = *src as f32;
        }
        Self::Mat4(out)
    }

    /// Raw bytes in upload layout
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Int(v) => bytemuck::bytes_of(v),
            Self::Float(v) => bytemuck::bytes_of(v),
            Self::Mat4(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Named uniform
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    /// Shader-visible name
    pub name: String,
    /// Current value
    pub value: UniformValue,
}

impl Uniform {
    /// Create a uniform
    pub fn new(name: impl Into<String>, value: UniformValue) -> Self {
        Self { name: name.into(), value }
    }

    /// Integer uniform, also used for samplers
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, UniformValue::Int(value))
    }

    /// Float uniform
    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::new(name, UniformValue::Float(value))
    }
}

bitflags! {
    /// Texture coordinates produced by a texgen
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TexGenCoords: u8 {
        /// s
        const S = 1 << 0;
        /// t
        const T = 1 << 1;
        /// r
        const R = 1 << 2;
        /// q
        const Q = 1 << 3;
    }
}

/// A texture bound to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    /// Texture unit
    pub unit: u32,
    /// Bound texture
    pub texture: TextureHandle,
}

/// Eye-linear texture coordinate generation for one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexGenBinding {
    /// Texture unit
    pub unit: u32,
    /// World position to shadow texture coordinates
    pub world_to_texture: Mat4,
    /// Main-camera eye position to shadow texture coordinates
    pub eye_to_texture: Mat4,
    /// Coordinates generated
    pub coords: TexGenCoords,
}

/// State block consumed by the receiver pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowStateSet {
    /// Texture bindings
    pub textures: Vec<TextureBinding>,
    /// Texture coordinate generators
    pub texgens: Vec<TexGenBinding>,
    /// Uniforms
    pub uniforms: Vec<Uniform>,
    /// Receiver program, if the backend provided one
    pub program: Option<ProgramHandle>,
}

impl ShadowStateSet {
    /// Remove everything
    pub fn clear(&mut self) {
        self.textures.clear();
        self.texgens.clear();
        self.uniforms.clear();
        self.program = None;
    }

    /// Bind a texture, replacing whatever was on the unit
    pub fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.textures.retain(|b| b.unit != unit);
        self.textures.push(TextureBinding { unit, texture });
    }

    /// Add a texgen, replacing whatever was on the unit
    pub fn set_texgen(&mut self, texgen: TexGenBinding) {
        self.texgens.retain(|t| t.unit != texgen.unit);
        self.texgens.push(texgen);
    }

    /// Add or overwrite a uniform by name
    pub fn set_uniform(&mut self, uniform: Uniform) {
        match self.uniforms.iter_mut().find(|u| u.name == uniform.name) {
            Some(existing) => existing.value = uniform.value,
            None => self.uniforms.push(uniform),
        }
    }

    /// Uniform by name
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| &u.value)
    }

    /// Texture bound to a unit
    pub fn texture_on(&self, unit: u32) -> Option<TextureHandle> {
        self.textures.iter().find(|b| b.unit == unit).map(|b| b.texture)
    }
}

/// State casters are rendered with
#[derive(Debug, Clone, PartialEq)]
pub struct CastingState {
    /// Shared attributes, at most one per kind
    pub attributes: Vec<Arc<StateAttribute>>,
    /// Depth-only program, if the backend provided one
    pub program: Option<ProgramHandle>,
}

impl CastingState {
    /// Build the caster state from tuning parameters
    pub fn new(cache: &StateCache, front_face_culling: bool, polygon_offset: (f32, f32), program: Option<ProgramHandle>) -> Self {
        let mut state = Self { attributes: Vec::new(), program };
        state.set(cache, StateAttribute::DepthClamp(true));
        state.set(cache, StateAttribute::Depth { func: CompareFunc::LessEqual, write: true });
        state.set_front_face_culling(cache, front_face_culling);
        state.set_polygon_offset(cache, polygon_offset.0, polygon_offset.1);
        state
    }

    /// Replace the attribute of the same kind
    pub fn set(&mut self, cache: &StateCache, attribute: StateAttribute) {
        self.attributes.retain(|a| !a.same_kind(&attribute));
        self.attributes.push(cache.share(attribute));
    }

    /// Cull front faces so depth comes from back faces, or render both sides
    pub fn set_front_face_culling(&mut self, cache: &StateCache, enabled: bool) {
        let mode = enabled.then_some(CullFaceMode::Front);
        self.set(cache, StateAttribute::CullFace(mode));
    }

    /// Depth bias applied while rendering casters
    pub fn set_polygon_offset(&mut self, cache: &StateCache, factor: f32, units: f32) {
        self.set(cache, StateAttribute::PolygonOffset { factor, units });
    }

    /// The cull-face attribute, if present
    pub fn cull_face(&self) -> Option<Option<CullFaceMode>> {
        self.attributes.iter().find_map(|a| match **a {
            StateAttribute::CullFace(mode) => Some(mode),
            _ => None,
        })
    }

    /// The polygon-offset attribute, if present
    pub fn polygon_offset(&self) -> Option<(f32, f32)> {
        self.attributes.iter().find_map(|a| match **a {
            StateAttribute::PolygonOffset { factor, units } => Some((factor, units)),
            _ => None,
        })
    }
}
