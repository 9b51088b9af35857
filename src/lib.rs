//! GPU Resource Cache - load-once, thread-safe caching of GPU resources
//!
//! Resources are requested by path, name or shader key and created on first
//! use. Device adapters:
//! - **wgpu**: real GPU objects through a wgpu device and queue
//! - **Dummy**: no GPU; validates and counts calls, for tests and tools
//!
//! # Features
//! - Textures decoded from image files (PNG, JPEG, BMP, ...) into RGBA8
//! - WGSL shaders compiled to SPIR-V with naga, with input layouts matched
//!   against the reflected vertex inputs
//! - Vertex, index and constant buffers
//! - At most one load per key, even when many threads miss at once
//! - Borrowed handles that report release instead of dangling
//! - A small egui widget registry for debug panels

pub mod cache;
pub mod compiler;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod key;
pub mod source;
pub mod ui;

pub use cache::{CacheStats, Handle, ResourceCache, ResourceCacheBuilder, ResourceKind};
pub use compiler::{CompileFlags, CompiledShader, NagaCompiler, ShaderCompiler, ShaderProfile, ShaderStage};
pub use config::CacheConfig;
pub use decoder::{DecodedImage, ImageDecoder, PixelFormat, StandardDecoder};
pub use device::{
    BindFlags, BufferDescriptor, BufferUsage, CpuAccess, DeviceAdapter, DummyDevice, InputElement,
    VertexFormat,
};
#[cfg(feature = "wgpu-device")]
pub use device::WgpuDevice;
pub use error::{CacheError, CacheResult, CompileError, DecodeError, DeviceError, SourceError};
pub use key::{KeyPolicy, ResourceKey, ShaderKey};
pub use source::{AssetSource, FileSystemSource, MemorySource};
pub use ui::{Widget, WidgetRegistry};
