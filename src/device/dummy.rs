//! Dummy device adapter for testing and headless use.
//!
//! This adapter doesn't touch a GPU but validates every request the way a
//! real device would, and records what happened in [`DeviceStats`] so tests
//! can observe call counts, object lifetimes and call overlap.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::compiler::{CompiledShader, ShaderStage};
use crate::decoder::{DecodedImage, PixelFormat};
use crate::error::{DeviceError, DeviceResult};

use super::{
    resolve_input_layout, validate_buffer, validate_bytecode, validate_image, BufferDescriptor,
    CpuAccess, DeviceAdapter, InputElement, ResolvedLayout,
};

/// Device entry points, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCall {
    CreateTexture,
    CreateBuffer,
    WriteBuffer,
    CreateVertexShader,
    CreatePixelShader,
    CreateInputLayout,
}

/// Counters shared between a [`DummyDevice`] and every object it created.
#[derive(Debug, Default)]
pub struct DeviceStats {
    textures_created: AtomicUsize,
    buffers_created: AtomicUsize,
    buffer_writes: AtomicUsize,
    vertex_shaders_created: AtomicUsize,
    pixel_shaders_created: AtomicUsize,
    input_layouts_created: AtomicUsize,
    live_objects: AtomicUsize,
    active_calls: AtomicUsize,
    overlapping_calls: AtomicUsize,
    device_dropped: AtomicBool,
    live_objects_at_drop: AtomicUsize,
}

impl DeviceStats {
    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::Acquire)
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::Acquire)
    }

    pub fn buffer_writes(&self) -> usize {
        self.buffer_writes.load(Ordering::Acquire)
    }

    pub fn vertex_shaders_created(&self) -> usize {
        self.vertex_shaders_created.load(Ordering::Acquire)
    }

    pub fn pixel_shaders_created(&self) -> usize {
        self.pixel_shaders_created.load(Ordering::Acquire)
    }

    pub fn input_layouts_created(&self) -> usize {
        self.input_layouts_created.load(Ordering::Acquire)
    }

    /// Total successful create calls of every kind.
    pub fn total_created(&self) -> usize {
        self.textures_created()
            + self.buffers_created()
            + self.vertex_shaders_created()
            + self.pixel_shaders_created()
            + self.input_layouts_created()
    }

    /// Objects created and not yet dropped.
    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::Acquire)
    }

    /// Number of calls that started while another call was still running.
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping_calls.load(Ordering::Acquire)
    }

    pub fn device_dropped(&self) -> bool {
        self.device_dropped.load(Ordering::Acquire)
    }

    /// Objects that were still alive when the device was dropped.
    pub fn live_objects_at_drop(&self) -> usize {
        self.live_objects_at_drop.load(Ordering::Acquire)
    }
}

/// Keeps `live_objects` accurate for one dummy object.
#[derive(Debug)]
struct LiveToken {
    stats: Arc<DeviceStats>,
}

impl LiveToken {
    fn new(stats: &Arc<DeviceStats>) -> Self {
        stats.live_objects.fetch_add(1, Ordering::AcqRel);
        Self {
            stats: Arc::clone(stats),
        }
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.stats.live_objects.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Marks a call as running for overlap detection.
struct CallScope<'a> {
    stats: &'a DeviceStats,
}

impl<'a> CallScope<'a> {
    fn enter(stats: &'a DeviceStats) -> Self {
        if stats.active_calls.fetch_add(1, Ordering::AcqRel) > 0 {
            stats.overlapping_calls.fetch_add(1, Ordering::AcqRel);
        }
        Self { stats }
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.stats.active_calls.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct DummyTexture {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    _live: LiveToken,
}

#[derive(Debug)]
pub struct DummyBuffer {
    pub id: u64,
    pub descriptor: BufferDescriptor,
    contents: Mutex<Vec<u8>>,
    _live: LiveToken,
}

impl DummyBuffer {
    /// Snapshot of the buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().clone()
    }
}

#[derive(Debug)]
pub struct DummyShader {
    pub id: u64,
    pub stage: ShaderStage,
    pub entry_point: String,
    pub byte_len: usize,
    _live: LiveToken,
}

#[derive(Debug)]
pub struct DummyInputLayout {
    pub id: u64,
    pub layout: ResolvedLayout,
    _live: LiveToken,
}

/// Dummy device adapter.
///
/// # Example
///
/// ```ignore
/// let device = DummyDevice::new();
/// let stats = device.stats();
/// let cache = ResourceCache::builder(Arc::new(device)).build();
/// cache.get_or_load_texture("ui/icon.png")?;
/// assert_eq!(stats.textures_created(), 1);
/// ```
#[derive(Debug)]
pub struct DummyDevice {
    stats: Arc<DeviceStats>,
    valid: bool,
    max_texture_dimension: u32,
    call_delay: Option<Duration>,
    next_id: AtomicU64,
    failures: Mutex<Vec<(DeviceCall, DeviceError)>>,
}

impl DummyDevice {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(DeviceStats::default()),
            valid: true,
            max_texture_dimension: 16384,
            call_delay: None,
            next_id: AtomicU64::new(1),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// A device whose context is unusable, as if initialization had failed.
    pub fn invalid() -> Self {
        let mut device = Self::new();
        device.valid = false;
        device
    }

    /// Sleep inside every call, to widen race windows in tests.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    /// Get the shared statistics.
    pub fn stats(&self) -> Arc<DeviceStats> {
        Arc::clone(&self.stats)
    }

    /// Make the next call of the given kind fail with `error`.
    pub fn fail_next(&self, call: DeviceCall, error: DeviceError) {
        self.failures.lock().push((call, error));
    }

    fn begin(&self, call: DeviceCall) -> DeviceResult<CallScope<'_>> {
        let scope = CallScope::enter(&self.stats);
        if let Some(delay) = self.call_delay {
            std::thread::sleep(delay);
        }

        let mut failures = self.failures.lock();
        if let Some(index) = failures.iter().position(|(c, _)| *c == call) {
            let (_, error) = failures.remove(index);
            log::trace!("DummyDevice: injected failure for {:?}: {}", call, error);
            return Err(error);
        }
        Ok(scope)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DummyDevice {
    fn drop(&mut self) {
        let live = self.stats.live_objects();
        if live > 0 {
            log::warn!("DummyDevice: dropped with {} live objects", live);
        }
        self.stats.live_objects_at_drop.store(live, Ordering::Release);
        self.stats.device_dropped.store(true, Ordering::Release);
    }
}

impl DeviceAdapter for DummyDevice {
    type Texture = DummyTexture;
    type Buffer = DummyBuffer;
    type VertexShader = DummyShader;
    type PixelShader = DummyShader;
    type InputLayout = DummyInputLayout;

    fn name(&self) -> &str {
        "Dummy Device"
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn create_texture_view(&self, label: &str, image: &DecodedImage) -> DeviceResult<DummyTexture> {
        let _scope = self.begin(DeviceCall::CreateTexture)?;
        validate_image(image, self.max_texture_dimension)?;

        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{})",
            label,
            image.width,
            image.height
        );
        self.stats.textures_created.fetch_add(1, Ordering::AcqRel);
        Ok(DummyTexture {
            id: self.next_id(),
            width: image.width,
            height: image.height,
            format: image.format,
            _live: LiveToken::new(&self.stats),
        })
    }

    fn create_buffer(
        &self,
        label: &str,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> DeviceResult<DummyBuffer> {
        let _scope = self.begin(DeviceCall::CreateBuffer)?;
        validate_buffer(descriptor, data)?;

        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            label,
            descriptor.byte_size()
        );
        let contents = match data {
            Some(bytes) => bytes.to_vec(),
            None => vec![0u8; descriptor.byte_size() as usize],
        };
        self.stats.buffers_created.fetch_add(1, Ordering::AcqRel);
        Ok(DummyBuffer {
            id: self.next_id(),
            descriptor: *descriptor,
            contents: Mutex::new(contents),
            _live: LiveToken::new(&self.stats),
        })
    }

    fn write_buffer(&self, buffer: &DummyBuffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let _scope = self.begin(DeviceCall::WriteBuffer)?;
        if buffer.descriptor.cpu_access != CpuAccess::Write {
            return Err(DeviceError::InvalidUsage(format!(
                "buffer {} was not created with CPU write access",
                buffer.id
            )));
        }

        let mut contents = buffer.contents.lock();
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= contents.len() as u64)
            .ok_or_else(|| {
                DeviceError::InvalidDescription(format!(
                    "write of {} bytes at offset {offset} overruns buffer of {} bytes",
                    data.len(),
                    contents.len()
                ))
            })?;
        contents[offset as usize..end as usize].copy_from_slice(data);

        log::trace!("DummyDevice: write_buffer offset={} len={}", offset, data.len());
        self.stats.buffer_writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn create_vertex_shader(&self, label: &str, shader: &CompiledShader) -> DeviceResult<DummyShader> {
        let _scope = self.begin(DeviceCall::CreateVertexShader)?;
        validate_bytecode(shader)?;
        if shader.stage != ShaderStage::Vertex {
            return Err(DeviceError::InvalidDescription(format!(
                "{} bytecode passed to create_vertex_shader",
                shader.stage
            )));
        }

        log::trace!("DummyDevice: creating vertex shader {:?}", label);
        self.stats.vertex_shaders_created.fetch_add(1, Ordering::AcqRel);
        Ok(DummyShader {
            id: self.next_id(),
            stage: shader.stage,
            entry_point: shader.entry_point.clone(),
            byte_len: shader.byte_len(),
            _live: LiveToken::new(&self.stats),
        })
    }

    fn create_pixel_shader(&self, label: &str, shader: &CompiledShader) -> DeviceResult<DummyShader> {
        let _scope = self.begin(DeviceCall::CreatePixelShader)?;
        validate_bytecode(shader)?;
        if shader.stage != ShaderStage::Pixel {
            return Err(DeviceError::InvalidDescription(format!(
                "{} bytecode passed to create_pixel_shader",
                shader.stage
            )));
        }

        log::trace!("DummyDevice: creating pixel shader {:?}", label);
        self.stats.pixel_shaders_created.fetch_add(1, Ordering::AcqRel);
        Ok(DummyShader {
            id: self.next_id(),
            stage: shader.stage,
            entry_point: shader.entry_point.clone(),
            byte_len: shader.byte_len(),
            _live: LiveToken::new(&self.stats),
        })
    }

    fn create_input_layout(
        &self,
        label: &str,
        shader: &CompiledShader,
        elements: &[InputElement],
    ) -> DeviceResult<DummyInputLayout> {
        let _scope = self.begin(DeviceCall::CreateInputLayout)?;
        validate_bytecode(shader)?;
        let layout = resolve_input_layout(shader, elements)?;

        log::trace!(
            "DummyDevice: creating input layout {:?} ({} attributes, stride {})",
            label,
            layout.attributes.len(),
            layout.stride
        );
        self.stats.input_layouts_created.fetch_add(1, Ordering::AcqRel);
        Ok(DummyInputLayout {
            id: self.next_id(),
            layout,
            _live: LiveToken::new(&self.stats),
        })
    }
}
