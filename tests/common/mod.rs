//! Shared fixtures: fake engines behind the real registry, and a local
//! object store rooted in a temp directory.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use roswap::config::PipelineConfig;
use roswap::engine::{
    DetectedFace, EngineFactory, FaceAnalyzer, FaceBox, FaceRestorer, FaceSwapper, ModelRegistry,
    RestoreOptions, Restored,
};
use roswap::service::{OutputKeyPolicy, SwapService};
use roswap::storage::LocalObjectStore;

/// Pixel value the fake analyzer treats as "no face"
pub const BLANK: u8 = 0;

/// How much the fake restorer brightens its input
pub const RESTORE_GAIN: u8 = 10;

#[derive(Debug, Clone, Copy)]
pub enum RestorerMode {
    /// One candidate, brightened
    Brighten,
    /// An empty candidate list
    Empty,
    /// A grayscale image for a color input
    Grayscale,
}

#[derive(Default)]
pub struct Calls {
    pub analyze: AtomicUsize,
    pub swap: AtomicUsize,
    pub restore: AtomicUsize,
}

impl Calls {
    pub fn analyze(&self) -> usize {
        self.analyze.load(Ordering::SeqCst)
    }

    pub fn swaps(&self) -> usize {
        self.swap.load(Ordering::SeqCst)
    }
}

/// Faces are keyed on the red channel of pixel (0, 0); the embedding is
/// that value, and the swapper paints it over the whole target.
struct FakeAnalyzer(Arc<Calls>);

impl FaceAnalyzer for FakeAnalyzer {
    fn analyze(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>> {
        self.0.analyze.fetch_add(1, Ordering::SeqCst);

        let rgb = image.to_rgb8();
        let value = rgb.get_pixel(0, 0)[0];
        if value == BLANK {
            return Ok(Vec::new());
        }

        Ok(vec![DetectedFace {
            bbox: FaceBox {
                x1: 0.0,
                y1: 0.0,
                x2: rgb.width() as f32,
                y2: rgb.height() as f32,
                confidence: 0.9,
                landmarks: [(1.0, 1.0); 5],
            },
            embedding: vec![value as f32],
        }])
    }
}

struct FakeSwapper(Arc<Calls>);

impl FaceSwapper for FakeSwapper {
    fn swap(&mut self, target: &DynamicImage, _: &DetectedFace, source: &DetectedFace) -> Result<DynamicImage> {
        self.0.swap.fetch_add(1, Ordering::SeqCst);
        let value = source.embedding[0] as u8;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            target.width(),
            target.height(),
            Rgb([value; 3]),
        )))
    }
}

struct FakeRestorer(Arc<Calls>, RestorerMode);

impl FaceRestorer for FakeRestorer {
    fn restore(&mut self, image: &DynamicImage, _: &RestoreOptions) -> Result<Restored> {
        self.0.restore.fetch_add(1, Ordering::SeqCst);
        Ok(match self.1 {
            RestorerMode::Brighten => {
                let mut rgb = image.to_rgb8();
                for pixel in rgb.pixels_mut() {
                    pixel.0 = pixel.0.map(|c| c.saturating_add(RESTORE_GAIN));
                }
                Restored::Candidates(vec![DynamicImage::ImageRgb8(rgb)])
            }
            RestorerMode::Empty => Restored::Candidates(Vec::new()),
            RestorerMode::Grayscale => Restored::Image(DynamicImage::ImageLuma8(image.to_luma8())),
        })
    }
}

pub struct FakeFactory {
    calls: Arc<Calls>,
    restorer: RestorerMode,
    fail_loads: bool,
}

impl EngineFactory for FakeFactory {
    fn load_analyzer(&self) -> Result<Box<dyn FaceAnalyzer>> {
        if self.fail_loads {
            anyhow::bail!("models/det_10g.onnx not found");
        }
        Ok(Box::new(FakeAnalyzer(self.calls.clone())))
    }

    fn load_swapper(&self) -> Result<Box<dyn FaceSwapper>> {
        Ok(Box::new(FakeSwapper(self.calls.clone())))
    }

    fn load_restorer(&self) -> Result<Box<dyn FaceRestorer>> {
        Ok(Box::new(FakeRestorer(self.calls.clone(), self.restorer)))
    }
}

pub struct FixtureOptions {
    pub restoration: Option<RestorerMode>,
    pub policy: OutputKeyPolicy,
    pub fail_loads: bool,
    pub preload: bool,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            restoration: None,
            policy: OutputKeyPolicy::Simple,
            fail_loads: false,
            preload: true,
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub calls: Arc<Calls>,
    pub registry: Arc<ModelRegistry>,
    pub store: Arc<LocalObjectStore>,
    pub service: Arc<SwapService<LocalObjectStore>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(FixtureOptions::default())
    }

    pub fn with_options(options: FixtureOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = dir.path().join("tmp");
        std::fs::create_dir_all(&temp_dir).unwrap();

        let calls = Arc::new(Calls::default());
        let factory = FakeFactory {
            calls: calls.clone(),
            restorer: options.restoration.unwrap_or(RestorerMode::Brighten),
            fail_loads: options.fail_loads,
        };
        let registry = Arc::new(ModelRegistry::new(Box::new(factory), options.restoration.is_some()));
        if options.preload {
            registry.ensure_ready_once().unwrap();
        }

        let store = Arc::new(LocalObjectStore::new(dir.path().join("buckets")));
        let pipeline = PipelineConfig {
            restoration_enabled: options.restoration.is_some(),
            output_key_policy: options.policy,
            temp_dir,
        };
        let service = Arc::new(SwapService::new(registry.clone(), store.clone(), pipeline));

        Self {
            dir,
            calls,
            registry,
            store,
            service,
        }
    }

    /// Store an object under `<root>/<bucket>/<key>`
    pub fn put(&self, bucket: &str, key: &str, data: &[u8]) {
        let path = self.object(bucket, key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    pub fn object(&self, bucket: &str, key: &str) -> PathBuf {
        self.store.object_path(bucket, key).unwrap()
    }

    /// Number of files left in the request temp directory
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("tmp")).unwrap().count()
    }

    /// Put the standard role (`b1/r.jpg`) and child (`b2/c.jpg`) images
    pub fn put_pair(&self, role_value: u8, child_value: u8) {
        self.put("b1", "r.jpg", &solid_png(role_value));
        self.put("b2", "c.jpg", &solid_png(child_value));
    }
}

/// A 16x16 single-color PNG
pub fn solid_png(value: u8) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([value; 3])));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Centre pixel of a stored image
pub fn center_value(path: &std::path::Path) -> u8 {
    let image = image::open(path).unwrap().to_rgb8();
    image.get_pixel(image.width() / 2, image.height() / 2)[0]
}

pub fn close(actual: u8, expected: u8) -> bool {
    actual.abs_diff(expected) <= 2
}
