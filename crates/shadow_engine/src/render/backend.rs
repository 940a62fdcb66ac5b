//! Backend abstraction for shadow-map GPU resources
//!
//! The shadow engine never talks to a graphics API directly. It asks a
//! [`ShadowBackend`] for textures, render targets and programs and gets
//! back opaque handles. Allocation failure surfaces as a [`BackendError`];
//! the engine treats it as "skip this cascade" rather than aborting a frame.

use std::sync::{Mutex, PoisonError};

use slotmap::SlotMap;

use crate::render::state::Uniform;

slotmap::new_key_type! {
    /// Handle to a texture owned by the backend
    pub struct TextureHandle;

    /// Handle to a render target (framebuffer plus attachment) owned by the backend
    pub struct RenderTargetHandle;

    /// Handle to a linked shader program owned by the backend
    pub struct ProgramHandle;
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a backend
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The device could not allocate the resource
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// The graphics context is gone
    #[error("Graphics context lost")]
    ContextLost,

    /// A handle was used after release or never existed
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),
}

/// Texel format of a shadow texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Depth component texture
    Depth,
    /// 8-bit RGB color, used when visualising shadow maps
    Rgb8,
    /// 8-bit RGBA color
    Rgba8,
}

/// Texture filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to the border color
    ClampToBorder,
    /// Repeat
    Repeat,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    /// Passes if the incoming value is less than or equal to the stored value
    LessEqual,
    /// Passes if the incoming value is less than the stored value
    Less,
    /// Always passes
    Always,
}

/// Everything a backend needs to allocate a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Hardware depth comparison on sampling, if any
    pub compare: Option<CompareFunc>,
    /// Minification and magnification filter
    pub filter: FilterMode,
    /// Wrapping on all axes
    pub wrap: WrapMode,
    /// Border color used with [`WrapMode::ClampToBorder`]
    pub border_color: [f32; 4],
}

impl TextureDesc {
    /// A depth texture suitable for shadow comparison sampling.
    ///
    /// Lookups outside the map hit a white border, i.e. "fully lit".
    pub const fn shadow_depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Depth,
            compare: Some(CompareFunc::LessEqual),
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToBorder,
            border_color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    /// A color texture used when shadow maps are drawn for debugging
    pub const fn debug_color(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgb8,
            compare: None,
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToBorder,
            border_color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    /// 1x1 texture bound where a sampler must exist but nothing was rendered
    pub const fn fallback(format: TextureFormat) -> Self {
        Self {
            width: 1,
            height: 1,
            format,
            compare: None,
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
            border_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Which buffer of a render target the camera writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Depth buffer
    Depth,
    /// First color buffer
    Color,
}

/// Render target description
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    /// Texture rendered into
    pub texture: TextureHandle,
    /// Attachment point of `texture`
    pub attachment: Attachment,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Programs the shadow engine asks for by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Depth-only program used while rendering casters
    ShadowCasting,
    /// Receiver program that samples the published shadow maps
    ShadowReceiving,
}

/// Graphics resource layer the shadow engine allocates through
///
/// Implementations must be shareable between traversal threads.
pub trait ShadowBackend: Send + Sync + std::fmt::Debug {
    /// Allocate a texture
    fn create_texture(&self, desc: &TextureDesc) -> BackendResult<TextureHandle>;

    /// Free a texture. Unknown handles are ignored.
    fn release_texture(&self, handle: TextureHandle);

    /// Allocate a render target binding a texture attachment
    fn create_render_target(&self, desc: &RenderTargetDesc) -> BackendResult<RenderTargetHandle>;

    /// Free a render target. Unknown handles are ignored.
    fn release_render_target(&self, handle: RenderTargetHandle);

    /// Obtain a program for a role
    fn create_program(&self, kind: ProgramKind) -> BackendResult<ProgramHandle>;

    /// Free a program. Unknown handles are ignored.
    fn release_program(&self, handle: ProgramHandle);

    /// Replace the uniform block of a program with `uniforms`, packed in order
    fn upload_uniforms(&self, program: ProgramHandle, uniforms: &[Uniform]) -> BackendResult<()>;
}

#[derive(Debug)]
struct HeadlessProgram {
    kind: ProgramKind,
    uniform_block: Vec<u8>,
}

#[derive(Debug, Default)]
struct HeadlessResources {
    textures: SlotMap<TextureHandle, TextureDesc>,
    render_targets: SlotMap<RenderTargetHandle, RenderTargetDesc>,
    programs: SlotMap<ProgramHandle, HeadlessProgram>,
    stale_releases: usize,
    fail_allocations: bool,
}

/// Backend that only does bookkeeping
///
/// Used by tools and tests: it hands out real, generation-checked handles so
/// leaks and double releases are observable without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    resources: Mutex<HeadlessResources>,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HeadlessResources) -> R) -> R {
        let mut guard = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Make every following allocation fail, simulating device exhaustion
    pub fn set_fail_allocations(&self, fail: bool) {
        self.with(|r| r.fail_allocations = fail);
    }

    /// Number of textures currently alive
    pub fn live_textures(&self) -> usize {
        self.with(|r| r.textures.len())
    }

    /// Number of render targets currently alive
    pub fn live_render_targets(&self) -> usize {
        self.with(|r| r.render_targets.len())
    }

    /// Number of programs currently alive
    pub fn live_programs(&self) -> usize {
        self.with(|r| r.programs.len())
    }

    /// Releases of handles that were already gone
    pub fn stale_releases(&self) -> usize {
        self.with(|r| r.stale_releases)
    }

    /// Role a live program was created for
    pub fn program_kind(&self, handle: ProgramHandle) -> Option<ProgramKind> {
        self.with(|r| r.programs.get(handle).map(|p| p.kind))
    }

    /// Bytes last uploaded to a live program
    pub fn uniform_block(&self, handle: ProgramHandle) -> Option<Vec<u8>> {
        self.with(|r| r.programs.get(handle).map(|p| p.uniform_block.clone()))
    }

    /// Description of a live texture
    pub fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc> {
        self.with(|r| r.textures.get(handle).cloned())
    }
}

impl ShadowBackend for HeadlessBackend {
    fn create_texture(&self, desc: &TextureDesc) -> BackendResult<TextureHandle> {
        self.with(|r| {
            if r.fail_allocations {
                return Err(BackendError::AllocationFailed(format!("{}x{} texture", desc.width, desc.height)));
            }
            Ok(r.textures.insert(desc.clone()))
        })
    }

    fn release_texture(&self, handle: TextureHandle) {
        self.with(|r| {
            if r.textures.remove(handle).is_none() {
                r.stale_releases += 1;
                log::warn!("Released unknown texture {handle:?}");
            }
        });
    }

    fn create_render_target(&self, desc: &RenderTargetDesc) -> BackendResult<RenderTargetHandle> {
        self.with(|r| {
            if r.fail_allocations {
                return Err(BackendError::AllocationFailed("render target".to_string()));
            }
            if !r.textures.contains_key(desc.texture) {
                return Err(BackendError::UnknownHandle(format!("{:?}", desc.texture)));
            }
            Ok(r.render_targets.insert(desc.clone()))
        })
    }

    fn release_render_target(&self, handle: RenderTargetHandle) {
        self.with(|r| {
            if r.render_targets.remove(handle).is_none() {
                r.stale_releases += 1;
                log::warn!("Released unknown render target {handle:?}");
            }
        });
    }

    fn create_program(&self, kind: ProgramKind) -> BackendResult<ProgramHandle> {
        self.with(|r| {
            if r.fail_allocations {
                return Err(BackendError::AllocationFailed(format!("{kind:?} program")));
            }
            Ok(r.programs.insert(HeadlessProgram { kind, uniform_block: Vec::new() }))
        })
    }

    fn release_program(&self, handle: ProgramHandle) {
        self.with(|r| {
            if r.programs.remove(handle).is_none() {
                r.stale_releases += 1;
                log::warn!("Released unknown program {handle:?}");
            }
        });
    }

    fn upload_uniforms(&self, program: ProgramHandle, uniforms: &[Uniform]) -> BackendResult<()> {
        self.with(|r| {
            let Some(target) = r.programs.get_mut(program) else {
                return Err(BackendError::UnknownHandle(format!("{program:?}")));
            };
            target.uniform_block.clear();
            for uniform in uniforms {
                target.uniform_block.extend_from_slice(uniform.value.as_bytes());
            }
            log::trace!("Uploaded {} uniform byte(s) to {program:?}", target.uniform_block.len());
            Ok(())
        })
    }
}
