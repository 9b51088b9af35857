//! Common utilities for resource cache integration tests.
//!
//! Provides instrumented decoders and compilers, an in-memory asset fixture
//! and a [`TestContext`] that wires them to a [`DummyDevice`].

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use gpu_resource_cache::device::DeviceStats;
use gpu_resource_cache::{
    CacheConfig, CompileError, CompileFlags, CompiledShader, DecodeError, DecodedImage,
    DummyDevice, ImageDecoder, MemorySource, NagaCompiler, ResourceCache, ShaderCompiler,
    ShaderProfile, StandardDecoder,
};

pub const ICON_PATH: &str = "ui/icon.png";
pub const SHADER_PATH: &str = "shaders/basic.wgsl";

/// Vertex and pixel entry points sharing one file.
pub const BASIC_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn VSMain(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip = vec4<f32>(input.position, 1.0);
    out.uv = input.uv;
    return out;
}

@fragment
fn PSMain(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;

/// `VSMain` with a syntax error on line 3.
pub const BROKEN_SHADER: &str = "@vertex\nfn VSMain(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {\n    return vec4<f32>(position 1.0);\n}\n";

/// Initialize logging for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Encode a solid-color RGBA PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("PNG encoding failed");
    bytes.into_inner()
}

// ============================================================================
// Gate
// ============================================================================

/// Blocks pipeline work until the test opens it.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    entered: Mutex<usize>,
    entered_changed: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Called from inside the pipeline.
    pub fn pass(&self) {
        {
            let mut entered = self.entered.lock();
            *entered += 1;
            self.entered_changed.notify_all();
        }
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    /// Block until `count` callers are waiting at the gate.
    pub fn wait_entered(&self, count: usize) {
        let mut entered = self.entered.lock();
        while *entered < count {
            self.entered_changed.wait(&mut entered);
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

// ============================================================================
// Instrumented collaborators
// ============================================================================

/// [`StandardDecoder`] that counts calls, with an optional delay and gate.
#[derive(Default)]
pub struct CountingDecoder {
    calls: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Arc<Gate>>,
}

impl CountingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_gate(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        StandardDecoder.decode(bytes)
    }
}

/// [`NagaCompiler`] that counts calls.
#[derive(Default)]
pub struct CountingCompiler {
    calls: AtomicUsize,
}

impl CountingCompiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ShaderCompiler for CountingCompiler {
    fn compile(
        &self,
        source: &str,
        path: &str,
        entry_point: &str,
        profile: &ShaderProfile,
        flags: CompileFlags,
    ) -> Result<CompiledShader, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        NagaCompiler.compile(source, path, entry_point, profile, flags)
    }
}

/// Compiler that fails with fixed diagnostics until told to succeed.
pub struct ScriptedCompiler {
    diagnostics: Mutex<Option<String>>,
}

impl ScriptedCompiler {
    pub fn failing(diagnostics: &str) -> Self {
        Self {
            diagnostics: Mutex::new(Some(diagnostics.to_string())),
        }
    }

    /// Compile normally from now on.
    pub fn fix(&self) {
        *self.diagnostics.lock() = None;
    }
}

impl ShaderCompiler for ScriptedCompiler {
    fn compile(
        &self,
        source: &str,
        path: &str,
        entry_point: &str,
        profile: &ShaderProfile,
        flags: CompileFlags,
    ) -> Result<CompiledShader, CompileError> {
        if let Some(diagnostics) = self.diagnostics.lock().as_ref() {
            return Err(CompileError::new(diagnostics.clone()));
        }
        NagaCompiler.compile(source, path, entry_point, profile, flags)
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A cache on a [`DummyDevice`] with in-memory assets.
pub struct TestContext {
    pub cache: ResourceCache<DummyDevice>,
    #[allow(dead_code)]
    pub device: Arc<DummyDevice>,
    pub stats: Arc<DeviceStats>,
    pub source: MemorySource,
    #[allow(dead_code)]
    pub decoder: Arc<CountingDecoder>,
    #[allow(dead_code)]
    pub compiler: Arc<CountingCompiler>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(DummyDevice::new(), CountingDecoder::new(), CacheConfig::default())
    }

    #[allow(dead_code)]
    pub fn with_decoder(decoder: CountingDecoder) -> Self {
        Self::build(DummyDevice::new(), decoder, CacheConfig::default())
    }

    #[allow(dead_code)]
    pub fn with_config(config: CacheConfig) -> Self {
        Self::build(DummyDevice::new(), CountingDecoder::new(), config)
    }

    pub fn build(device: DummyDevice, decoder: CountingDecoder, config: CacheConfig) -> Self {
        init_logging();

        let source = MemorySource::new()
            .with_file(ICON_PATH, png_bytes(4, 4, [255, 0, 0, 255]))
            .with_file(SHADER_PATH, BASIC_SHADER);
        let device = Arc::new(device);
        let stats = device.stats();
        let decoder = Arc::new(decoder);
        let compiler = Arc::new(CountingCompiler::default());

        let cache = ResourceCache::builder(Arc::clone(&device))
            .config(config)
            .decoder(decoder.clone())
            .compiler(compiler.clone())
            .source(Arc::new(source.clone()))
            .build();

        Self {
            cache,
            device,
            stats,
            source,
            decoder,
            compiler,
        }
    }
}
