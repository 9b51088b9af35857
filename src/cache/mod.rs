//! The resource cache.
//!
//! [`ResourceCache`] maps keys to GPU objects for five kinds of resources:
//! textures, buffers, vertex shaders, pixel shaders and input layouts. The
//! first request for a key runs the kind's pipeline (read, decode or
//! compile, create on the device); later requests return the stored object.
//!
//! # Locking
//!
//! - Each kind has its own [`table::ResourceTable`], locked only to look up
//!   or swap a slot.
//! - The device reference sits behind an `RwLock`. Loads hold it shared for
//!   their whole pipeline; [`ResourceCache::clear_all`] and
//!   [`ResourceCache::shutdown`] take it exclusively, so they wait for
//!   in-flight loads and no load can start during teardown.
//! - Device calls go through one mutex unless the adapter is
//!   [`DeviceAdapter::THREAD_SAFE`].

mod handle;
mod table;

pub use handle::Handle;

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

use crate::compiler::{CompiledShader, NagaCompiler, ShaderCompiler, ShaderProfile, ShaderStage};
use crate::config::CacheConfig;
use crate::decoder::{DecodedImage, ImageDecoder, StandardDecoder};
use crate::device::{validate_buffer, BindFlags, BufferDescriptor, BufferUsage, DeviceAdapter, InputElement};
use crate::error::{CacheError, CacheResult, CompileError, DecodeError, DeviceError};
use crate::key::{ResourceKey, ShaderKey};
use crate::source::{AssetSource, FileSystemSource};

use table::ResourceTable;

/// The five kinds of cached resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
    VertexShader,
    PixelShader,
    InputLayout,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Texture => "texture",
            ResourceKind::Buffer => "buffer",
            ResourceKind::VertexShader => "vertex shader",
            ResourceKind::PixelShader => "pixel shader",
            ResourceKind::InputLayout => "input layout",
        };
        f.write_str(name)
    }
}

/// Entry counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub textures: usize,
    pub buffers: usize,
    pub vertex_shaders: usize,
    pub pixel_shaders: usize,
    pub input_layouts: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.textures + self.buffers + self.vertex_shaders + self.pixel_shaders + self.input_layouts
    }
}

/// Builder for [`ResourceCache`].
///
/// Anything not supplied falls back to the standard collaborators:
/// [`StandardDecoder`], [`NagaCompiler`] and a [`FileSystemSource`] rooted at
/// [`CacheConfig::asset_root`].
pub struct ResourceCacheBuilder<D: DeviceAdapter> {
    device: Arc<D>,
    config: CacheConfig,
    decoder: Option<Arc<dyn ImageDecoder>>,
    compiler: Option<Arc<dyn ShaderCompiler>>,
    source: Option<Arc<dyn AssetSource>>,
}

impl<D: DeviceAdapter> ResourceCacheBuilder<D> {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn ShaderCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> ResourceCache<D> {
        let config = self.config;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FileSystemSource::new(config.asset_root.clone())));

        let device = if self.device.is_valid() {
            log::info!("Resource cache initialized on {}", self.device.name());
            Some(self.device)
        } else {
            log::error!(
                "Device {} is not usable; resource cache starts uninitialized",
                self.device.name()
            );
            None
        };

        ResourceCache {
            config,
            device: RwLock::new(device),
            device_calls: Mutex::new(()),
            decoder: self.decoder.unwrap_or_else(|| Arc::new(StandardDecoder)),
            compiler: self.compiler.unwrap_or_else(|| Arc::new(NagaCompiler)),
            source,
            textures: ResourceTable::new(ResourceKind::Texture),
            buffers: ResourceTable::new(ResourceKind::Buffer),
            vertex_shaders: ResourceTable::new(ResourceKind::VertexShader),
            pixel_shaders: ResourceTable::new(ResourceKind::PixelShader),
            input_layouts: ResourceTable::new(ResourceKind::InputLayout),
        }
    }
}

/// Thread-safe cache of GPU resources keyed by path, name or shader key.
///
/// # Example
///
/// ```ignore
/// let device = Arc::new(WgpuDevice::headless()?);
/// let cache = ResourceCache::builder(device)
///     .config(CacheConfig::default().with_asset_root("./assets"))
///     .build();
///
/// let icon = cache.get_or_load_texture("ui/icon.png")?;
/// let vs = cache.get_or_load_vertex_shader(
///     &ShaderKey::new("shaders/basic.wgsl", "VSMain", "vs_5_0"),
///     &[InputElement::new("POSITION", VertexFormat::Float32x3, 0)],
/// )?;
/// ```
pub struct ResourceCache<D: DeviceAdapter> {
    config: CacheConfig,
    device: RwLock<Option<Arc<D>>>,
    device_calls: Mutex<()>,
    decoder: Arc<dyn ImageDecoder>,
    compiler: Arc<dyn ShaderCompiler>,
    source: Arc<dyn AssetSource>,
    textures: ResourceTable<D::Texture>,
    buffers: ResourceTable<D::Buffer>,
    vertex_shaders: ResourceTable<D::VertexShader>,
    pixel_shaders: ResourceTable<D::PixelShader>,
    input_layouts: ResourceTable<D::InputLayout>,
}

impl<D: DeviceAdapter> ResourceCache<D> {
    /// Create a cache with default collaborators and configuration.
    pub fn new(device: Arc<D>) -> Self {
        Self::builder(device).build()
    }

    pub fn builder(device: Arc<D>) -> ResourceCacheBuilder<D> {
        ResourceCacheBuilder {
            device,
            config: CacheConfig::default(),
            decoder: None,
            compiler: None,
            source: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the cache holds a usable device.
    pub fn is_initialized(&self) -> bool {
        self.device.read().is_some()
    }

    pub fn device_name(&self) -> Option<String> {
        self.device.read().as_ref().map(|d| d.name().to_string())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            textures: self.textures.len(),
            buffers: self.buffers.len(),
            vertex_shaders: self.vertex_shaders.len(),
            pixel_shaders: self.pixel_shaders.len(),
            input_layouts: self.input_layouts.len(),
        }
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// Load an image file, decode it and upload it as a texture.
    pub fn get_or_load_texture(&self, path: &str) -> CacheResult<Handle<D::Texture>> {
        let key = self.key(ResourceKey::name(path))?;
        let device = self.device()?;

        let texture = self.textures.get_or_load(&key, self.config.load_timeout, || {
            let decode_error = |source| CacheError::Decode {
                key: key.clone(),
                source,
            };
            let bytes = self
                .source
                .read(key.path())
                .map_err(|e| decode_error(DecodeError::Unreadable(e.to_string())))?;
            let image = self.decoder.decode(&bytes).map_err(decode_error)?;
            self.create_texture(&device, &key, &image)
        })?;

        Ok(Handle::new(key, &texture))
    }

    /// Create a texture from pixels supplied by the caller, once per name.
    ///
    /// `create` only runs on a miss, and runs before any cache lock is
    /// taken, so it may call back into the cache. Two callers missing at the
    /// same time may both run `create`; only one texture is created.
    pub fn get_or_create_texture<F>(&self, name: &str, create: F) -> CacheResult<Handle<D::Texture>>
    where
        F: FnOnce() -> DecodedImage,
    {
        let key = self.key(ResourceKey::name(name))?;
        if let Some(texture) = self.textures.get(&key) {
            return Ok(Handle::new(key, &texture));
        }

        let image = create();
        let device = self.device()?;
        let texture = self.textures.get_or_load(&key, self.config.load_timeout, || {
            self.create_texture(&device, &key, &image)
        })?;

        Ok(Handle::new(key, &texture))
    }

    pub fn get_texture(&self, path: &str) -> Option<Handle<D::Texture>> {
        let key = self.key(ResourceKey::name(path)).ok()?;
        let texture = self.textures.get(&key)?;
        Some(Handle::new(key, &texture))
    }

    pub fn release_texture(&self, path: &str) -> bool {
        self.release(&self.textures, ResourceKey::name(path))
    }

    fn create_texture(&self, device: &D, key: &ResourceKey, image: &DecodedImage) -> CacheResult<D::Texture> {
        let label = key.to_string();
        self.device_call(|| device.create_texture_view(&label, image))
            .map_err(|source| CacheError::Device {
                key: key.clone(),
                source,
            })
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Create a buffer on first request for `name`.
    ///
    /// The descriptor and data are only inspected on a miss; a hit returns
    /// the existing buffer whatever was passed.
    pub fn get_or_load_buffer(
        &self,
        name: &str,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> CacheResult<Handle<D::Buffer>> {
        let key = self.key(ResourceKey::name(name))?;
        let device = self.device()?;

        if let Some(buffer) = self.buffers.get(&key) {
            return Ok(Handle::new(key, &buffer));
        }
        validate_buffer(descriptor, data).map_err(|e| match e {
            DeviceError::InvalidDescription(message) => {
                CacheError::InvalidArgument(format!("buffer '{key}': {message}"))
            }
            source => CacheError::Device {
                key: key.clone(),
                source,
            },
        })?;

        let buffer = self.buffers.get_or_load(&key, self.config.load_timeout, || {
            let label = key.to_string();
            self.device_call(|| device.create_buffer(&label, descriptor, data))
                .map_err(|source| CacheError::Device {
                    key: key.clone(),
                    source,
                })
        })?;

        Ok(Handle::new(key, &buffer))
    }

    /// Typed variant of [`ResourceCache::get_or_load_buffer`], sized from
    /// `data`.
    pub fn get_or_load_buffer_from<T: Pod>(
        &self,
        name: &str,
        data: &[T],
        usage: BufferUsage,
        bind_flags: BindFlags,
    ) -> CacheResult<Handle<D::Buffer>> {
        let element_size = u32::try_from(std::mem::size_of::<T>())
            .map_err(|_| CacheError::InvalidArgument("element type is too large".to_string()))?;
        let element_count = u32::try_from(data.len())
            .map_err(|_| CacheError::InvalidArgument("too many elements".to_string()))?;
        let descriptor = BufferDescriptor::new(element_size, element_count, usage, bind_flags);
        self.get_or_load_buffer(name, &descriptor, Some(bytemuck::cast_slice(data)))
    }

    /// Write CPU data into a cached buffer created with [`BufferUsage::Dynamic`].
    pub fn write_buffer(&self, name: &str, offset: u64, data: &[u8]) -> CacheResult<()> {
        let key = self.key(ResourceKey::name(name))?;
        let device = self.device()?;
        let buffer = self
            .buffers
            .get(&key)
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;

        self.device_call(|| device.write_buffer(&buffer, offset, data))
            .map_err(|source| CacheError::Device { key, source })
    }

    pub fn get_buffer(&self, name: &str) -> Option<Handle<D::Buffer>> {
        let key = self.key(ResourceKey::name(name)).ok()?;
        let buffer = self.buffers.get(&key)?;
        Some(Handle::new(key, &buffer))
    }

    pub fn release_buffer(&self, name: &str) -> bool {
        self.release(&self.buffers, ResourceKey::name(name))
    }

    // ========================================================================
    // Shaders
    // ========================================================================

    /// Compile and create a vertex shader together with the input layout
    /// described by `elements`.
    ///
    /// The layout is cached under the same key and is stored only if the
    /// shader is. `elements` are only used on a miss.
    pub fn get_or_load_vertex_shader(
        &self,
        shader: &ShaderKey,
        elements: &[InputElement],
    ) -> CacheResult<Handle<D::VertexShader>> {
        let key = self.key(ResourceKey::from(shader))?;
        let profile = self.profile(&key, shader, ShaderStage::Vertex)?;
        let device = self.device()?;

        let vertex_shader = self.vertex_shaders.get_or_load(&key, self.config.load_timeout, || {
            let compiled = self.compile(&key, &shader.entry_point, &profile)?;
            let label = key.to_string();
            let (vertex_shader, layout) = self
                .device_call(|| -> Result<_, DeviceError> {
                    let vertex_shader = device.create_vertex_shader(&label, &compiled)?;
                    let layout = device.create_input_layout(&label, &compiled, elements)?;
                    Ok((vertex_shader, layout))
                })
                .map_err(|source| CacheError::Device {
                    key: key.clone(),
                    source,
                })?;

            self.input_layouts.insert_ready(key.clone(), Arc::new(layout));
            Ok(vertex_shader)
        })?;

        Ok(Handle::new(key, &vertex_shader))
    }

    pub fn get_or_load_pixel_shader(&self, shader: &ShaderKey) -> CacheResult<Handle<D::PixelShader>> {
        let key = self.key(ResourceKey::from(shader))?;
        let profile = self.profile(&key, shader, ShaderStage::Pixel)?;
        let device = self.device()?;

        let pixel_shader = self.pixel_shaders.get_or_load(&key, self.config.load_timeout, || {
            let compiled = self.compile(&key, &shader.entry_point, &profile)?;
            let label = key.to_string();
            self.device_call(|| device.create_pixel_shader(&label, &compiled))
                .map_err(|source| CacheError::Device {
                    key: key.clone(),
                    source,
                })
        })?;

        Ok(Handle::new(key, &pixel_shader))
    }

    pub fn get_vertex_shader(&self, shader: &ShaderKey) -> Option<Handle<D::VertexShader>> {
        let key = self.key(ResourceKey::from(shader)).ok()?;
        let vertex_shader = self.vertex_shaders.get(&key)?;
        Some(Handle::new(key, &vertex_shader))
    }

    pub fn get_pixel_shader(&self, shader: &ShaderKey) -> Option<Handle<D::PixelShader>> {
        let key = self.key(ResourceKey::from(shader)).ok()?;
        let pixel_shader = self.pixel_shaders.get(&key)?;
        Some(Handle::new(key, &pixel_shader))
    }

    /// Input layout created alongside the vertex shader with this key.
    pub fn get_input_layout(&self, shader: &ShaderKey) -> Option<Handle<D::InputLayout>> {
        let key = self.key(ResourceKey::from(shader)).ok()?;
        let layout = self.input_layouts.get(&key)?;
        Some(Handle::new(key, &layout))
    }

    /// Release a vertex shader and the input layout created with it.
    pub fn release_vertex_shader(&self, shader: &ShaderKey) -> bool {
        let released = self.release(&self.vertex_shaders, ResourceKey::from(shader));
        if released {
            self.release(&self.input_layouts, ResourceKey::from(shader));
        }
        released
    }

    pub fn release_pixel_shader(&self, shader: &ShaderKey) -> bool {
        self.release(&self.pixel_shaders, ResourceKey::from(shader))
    }

    pub fn release_input_layout(&self, shader: &ShaderKey) -> bool {
        self.release(&self.input_layouts, ResourceKey::from(shader))
    }

    fn profile(&self, key: &ResourceKey, shader: &ShaderKey, stage: ShaderStage) -> CacheResult<ShaderProfile> {
        if shader.entry_point.is_empty() {
            return Err(CacheError::InvalidArgument(format!(
                "shader '{key}' has an empty entry point"
            )));
        }
        let profile = ShaderProfile::parse(&shader.profile).ok_or_else(|| {
            CacheError::InvalidArgument(format!("unknown shader profile '{}'", shader.profile))
        })?;
        if profile.stage != stage {
            return Err(CacheError::InvalidArgument(format!(
                "profile '{}' targets the {} stage, expected {stage}",
                shader.profile, profile.stage
            )));
        }
        Ok(profile)
    }

    fn compile(&self, key: &ResourceKey, entry_point: &str, profile: &ShaderProfile) -> CacheResult<CompiledShader> {
        let path = key.path();
        let compile_error = |source| CacheError::Compile {
            key: key.clone(),
            source,
        };

        let bytes = self.source.read(path).map_err(|e| {
            compile_error(CompileError::new(format!(
                "error: cannot read shader source: {e}\n  ┌─ {path}"
            )))
        })?;
        let source = String::from_utf8(bytes).map_err(|e| {
            compile_error(CompileError::new(format!(
                "error: shader source is not valid UTF-8: {e}\n  ┌─ {path}"
            )))
        })?;

        self.compiler
            .compile(&source, path, entry_point, profile, self.config.compile_flags)
            .map_err(compile_error)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release every entry in every table.
    ///
    /// Waits for in-flight loads to finish first.
    pub fn clear_all(&self) {
        let _device = self.device.write();
        let released = self.clear_tables();
        log::info!("Resource cache cleared ({} entries released)", released);
    }

    /// Release everything, then drop the device reference.
    ///
    /// Waits for in-flight loads. Afterwards every load fails with
    /// [`CacheError::InvalidArgument`]. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut device = self.device.write();
        let Some(current) = device.as_ref() else {
            return;
        };
        let name = current.name().to_string();

        let released = self.clear_tables();
        *device = None;
        log::info!(
            "Resource cache shut down ({} entries released, {} detached)",
            released,
            name
        );
    }

    fn clear_tables(&self) -> usize {
        self.input_layouts.clear()
            + self.vertex_shaders.clear()
            + self.pixel_shaders.clear()
            + self.buffers.clear()
            + self.textures.clear()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn key(&self, key: ResourceKey) -> CacheResult<ResourceKey> {
        let key = key.normalized(self.config.key_policy);
        let path = key.path();
        if path.is_empty() {
            return Err(CacheError::InvalidArgument(
                "resource path cannot be empty".to_string(),
            ));
        }
        if path.starts_with('/') || path == ".." || path.starts_with("../") {
            return Err(CacheError::InvalidArgument(format!(
                "resource path '{path}' leaves the asset root"
            )));
        }
        Ok(key)
    }

    fn device(&self) -> CacheResult<MappedRwLockReadGuard<'_, Arc<D>>> {
        RwLockReadGuard::try_map(self.device.read(), Option::as_ref).map_err(|_| {
            CacheError::InvalidArgument("resource cache is not initialized".to_string())
        })
    }

    fn device_call<R>(&self, call: impl FnOnce() -> R) -> R {
        let _serial = (!D::THREAD_SAFE).then(|| self.device_calls.lock());
        call()
    }

    fn release<T>(&self, table: &ResourceTable<T>, key: ResourceKey) -> bool {
        let Ok(key) = self.key(key) else {
            return false;
        };
        let released = table.remove(&key).is_some();
        if released {
            log::debug!("released '{}'", key);
        }
        released
    }
}

impl<D: DeviceAdapter> Drop for ResourceCache<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
