//! Device adapter abstraction.
//!
//! The [`DeviceAdapter`] trait is the only path through which the cache
//! allocates GPU objects. Implementations:
//! - [`WgpuDevice`] - wgpu device and queue (feature `wgpu-device`)
//! - [`DummyDevice`] - no GPU; validates and counts calls, for tests and
//!   headless tools

mod dummy;
#[cfg(feature = "wgpu-device")]
mod wgpu_device;

pub use dummy::{DeviceCall, DeviceStats, DummyBuffer, DummyDevice, DummyInputLayout, DummyShader, DummyTexture};
#[cfg(feature = "wgpu-device")]
pub use wgpu_device::{WgpuBuffer, WgpuDevice, WgpuInputLayout, WgpuShader, WgpuTexture};

use crate::compiler::CompiledShader;
use crate::decoder::DecodedImage;
use crate::error::{DeviceError, DeviceResult};

/// How a buffer is used after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Initialized once, never written again. Requires initial data.
    Immutable,
    /// Written by the GPU (copies), not by the CPU.
    #[default]
    Default,
    /// Rewritten from the CPU, typically every frame.
    Dynamic,
}

impl BufferUsage {
    /// CPU access implied by the usage.
    pub fn cpu_access(&self) -> CpuAccess {
        match self {
            BufferUsage::Dynamic => CpuAccess::Write,
            BufferUsage::Immutable | BufferUsage::Default => CpuAccess::None,
        }
    }
}

/// CPU access requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuAccess {
    #[default]
    None,
    Write,
}

/// Pipeline bind points a buffer may be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindFlags(u32);

impl BindFlags {
    pub const VERTEX: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const CONSTANT: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for BindFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Byte layout and usage of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub element_size: u32,
    pub element_count: u32,
    pub usage: BufferUsage,
    pub bind_flags: BindFlags,
    pub cpu_access: CpuAccess,
}

impl BufferDescriptor {
    pub fn new(element_size: u32, element_count: u32, usage: BufferUsage, bind_flags: BindFlags) -> Self {
        Self {
            element_size,
            element_count,
            usage,
            bind_flags,
            cpu_access: usage.cpu_access(),
        }
    }

    /// Total size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.element_size as u64 * self.element_count as u64
    }
}

/// Per-vertex attribute formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x4,
    Sint32,
    Unorm8x4,
    Uint8x4,
}

impl VertexFormat {
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32
            | VertexFormat::Uint32
            | VertexFormat::Sint32
            | VertexFormat::Unorm8x4
            | VertexFormat::Uint8x4 => 4,
            VertexFormat::Float32x2 | VertexFormat::Uint32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 | VertexFormat::Uint32x4 => 16,
        }
    }
}

/// One attribute of an input layout description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    /// Matched against the shader input name, ignoring ASCII case.
    pub semantic: String,
    pub format: VertexFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

impl InputElement {
    pub fn new(semantic: impl Into<String>, format: VertexFormat, offset: u32) -> Self {
        Self {
            semantic: semantic.into(),
            format,
            offset,
        }
    }
}

/// An input element bound to a shader input location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// A resolved input layout: attributes by location plus the vertex stride.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedLayout {
    pub attributes: Vec<ResolvedAttribute>,
    pub stride: u32,
}

/// Largest vertex stride an input layout may describe (wgpu's default limit).
pub const MAX_VERTEX_STRIDE: u32 = 2048;

/// Match input elements against a compiled vertex shader's input signature.
///
/// Every shader input must be covered by exactly one element. Elements that
/// match no input are ignored.
pub fn resolve_input_layout(
    shader: &CompiledShader,
    elements: &[InputElement],
) -> DeviceResult<ResolvedLayout> {
    let mut attributes = Vec::with_capacity(shader.inputs.len());

    for input in &shader.inputs {
        let mut matching = elements
            .iter()
            .filter(|e| e.semantic.eq_ignore_ascii_case(&input.name));
        let element = matching.next().ok_or_else(|| {
            DeviceError::InputSignatureMismatch(format!(
                "shader input '{}' (location {}) has no matching element",
                input.name, input.location
            ))
        })?;
        if matching.next().is_some() {
            return Err(DeviceError::InputSignatureMismatch(format!(
                "semantic '{}' is declared more than once",
                element.semantic
            )));
        }
        attributes.push(ResolvedAttribute {
            location: input.location,
            format: element.format,
            offset: element.offset,
        });
    }

    let mut stride = 0;
    for element in elements {
        let end = element
            .offset
            .checked_add(element.format.size())
            .filter(|end| *end <= MAX_VERTEX_STRIDE)
            .ok_or_else(|| {
                DeviceError::InvalidDescription(format!(
                    "input element '{}' at offset {} exceeds the maximum vertex stride of {} bytes",
                    element.semantic, element.offset, MAX_VERTEX_STRIDE
                ))
            })?;
        stride = stride.max(end);
    }

    for element in elements {
        if !shader
            .inputs
            .iter()
            .any(|i| i.name.eq_ignore_ascii_case(&element.semantic))
        {
            log::debug!(
                "input element '{}' is not consumed by '{}'",
                element.semantic,
                shader.entry_point
            );
        }
    }

    Ok(ResolvedLayout { attributes, stride })
}

/// The boundary component that allocates GPU objects.
///
/// All calls are synchronous. The adapter owns no cache state; the objects it
/// returns are owned by the cache and destroyed when dropped.
pub trait DeviceAdapter: Send + Sync + 'static {
    type Texture: Send + Sync + 'static;
    type Buffer: Send + Sync + 'static;
    type VertexShader: Send + Sync + 'static;
    type PixelShader: Send + Sync + 'static;
    type InputLayout: Send + Sync + 'static;

    /// Whether creation calls may run concurrently. When `false` the cache
    /// serializes every call through one lock.
    const THREAD_SAFE: bool = false;

    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Whether the underlying device and context are usable.
    fn is_valid(&self) -> bool {
        true
    }

    /// Create a sampled 2D texture and its shader view from decoded pixels.
    fn create_texture_view(&self, label: &str, image: &DecodedImage) -> DeviceResult<Self::Texture>;

    /// Create a buffer, optionally initialized with `data`.
    fn create_buffer(
        &self,
        label: &str,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> DeviceResult<Self::Buffer>;

    /// Write CPU data into a buffer created with [`CpuAccess::Write`].
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> DeviceResult<()>;

    fn create_vertex_shader(
        &self,
        label: &str,
        shader: &CompiledShader,
    ) -> DeviceResult<Self::VertexShader>;

    fn create_pixel_shader(
        &self,
        label: &str,
        shader: &CompiledShader,
    ) -> DeviceResult<Self::PixelShader>;

    /// Create an input layout matching `shader`'s vertex inputs.
    fn create_input_layout(
        &self,
        label: &str,
        shader: &CompiledShader,
        elements: &[InputElement],
    ) -> DeviceResult<Self::InputLayout>;
}

/// Validation shared by adapters before a buffer is allocated.
pub(crate) fn validate_buffer(descriptor: &BufferDescriptor, data: Option<&[u8]>) -> DeviceResult<()> {
    if descriptor.byte_size() == 0 {
        return Err(DeviceError::InvalidDescription(
            "buffer size cannot be zero".to_string(),
        ));
    }
    if descriptor.bind_flags.is_empty() {
        return Err(DeviceError::InvalidDescription(
            "buffer has no bind flags".to_string(),
        ));
    }
    match data {
        Some(bytes) if bytes.len() as u64 != descriptor.byte_size() => {
            Err(DeviceError::InvalidDescription(format!(
                "initial data is {} bytes, descriptor needs {}",
                bytes.len(),
                descriptor.byte_size()
            )))
        }
        None if descriptor.usage == BufferUsage::Immutable => Err(DeviceError::InvalidDescription(
            "immutable buffer requires initial data".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validation shared by adapters before a texture is allocated.
pub(crate) fn validate_image(image: &DecodedImage, max_dimension: u32) -> DeviceResult<()> {
    if image.width == 0 || image.height == 0 {
        return Err(DeviceError::InvalidDescription(
            "texture dimensions cannot be zero".to_string(),
        ));
    }
    if image.width > max_dimension || image.height > max_dimension {
        return Err(DeviceError::InvalidDescription(format!(
            "texture {}x{} exceeds maximum dimension {max_dimension}",
            image.width, image.height
        )));
    }
    if !image.is_consistent() {
        return Err(DeviceError::InvalidDescription(format!(
            "pixel buffer is {} bytes, {}x{} needs {}",
            image.pixels.len(),
            image.width,
            image.height,
            image.expected_len()
        )));
    }
    Ok(())
}

pub(crate) fn validate_bytecode(shader: &CompiledShader) -> DeviceResult<()> {
    if shader.words.is_empty() {
        return Err(DeviceError::InvalidDescription(
            "shader bytecode is empty".to_string(),
        ));
    }
    Ok(())
}
