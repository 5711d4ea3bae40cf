use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::gif::GifEncoder;
use image::{Frame, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;

use rust_pixel_pipeline::config::{
    AdvancedOptions, EffectOptions, FilterOptions, TransformOptions, WorkerFallback,
};
use rust_pixel_pipeline::tasks::{batch, video};
use rust_pixel_pipeline::{Error, ImageProcessor, PipelineConfig, ProcessingOptions, Source};

// 2x1 PNG: opaque red, then half-transparent blue.
const TWO_PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAIAAAABCAYAAAD0In+KAAAADklEQVR4nGP4z8AAQg0AD3oDfnfpf5cAAAAASUVORK5CYII=";

fn seeded(seed: u64) -> PipelineConfig {
    PipelineConfig {
        seed: Some(seed),
        ..PipelineConfig::default()
    }
}

fn invert() -> ProcessingOptions {
    ProcessingOptions {
        filters: Some(FilterOptions {
            invert: true,
            ..FilterOptions::default()
        }),
        ..ProcessingOptions::default()
    }
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8, 255])
    })
}

#[tokio::test]
async fn decodes_png_blob_and_inverts() {
    let bytes = STANDARD.decode(TWO_PIXEL_PNG).unwrap();
    let mut processor = ImageProcessor::new(&seeded(1));
    let out = processor
        .process(&Source::Blob(bytes), &invert())
        .await
        .unwrap();
    assert_eq!(out.dimensions(), (2, 1));
    assert_eq!(out.pixel(0, 0), [0, 255, 255, 255]);
    assert_eq!(out.pixel(1, 0), [255, 255, 0, 128]);
}

#[tokio::test]
async fn full_pipeline_is_reproducible_with_a_seed() {
    let options = ProcessingOptions {
        filters: Some(FilterOptions {
            brightness: Some(1.1),
            contrast: Some(1.2),
            ..FilterOptions::default()
        }),
        effects: Some(EffectOptions {
            glitch: true,
            pixelate: Some(2),
            noise: Some(0.3),
            ..EffectOptions::default()
        }),
        transforms: Some(TransformOptions {
            rotate: Some(10.0),
            flip_x: true,
            ..TransformOptions::default()
        }),
        advanced: Some(AdvancedOptions {
            crystallize: Some(4),
            edge_detection: true,
            ..AdvancedOptions::default()
        }),
    };
    let source = Source::Bitmap(gradient(16, 12));

    let mut first = ImageProcessor::new(&seeded(99));
    let mut second = ImageProcessor::new(&seeded(99));
    let a = first.process(&source, &options).await.unwrap();
    let b = second.process(&source, &options).await.unwrap();
    assert_eq!(a.dimensions(), (16, 12));
    assert_eq!(a, b);
}

#[tokio::test]
async fn invalid_options_are_rejected_before_decoding() {
    let options = ProcessingOptions {
        effects: Some(EffectOptions {
            pixelate: Some(0),
            ..EffectOptions::default()
        }),
        ..ProcessingOptions::default()
    };
    let mut processor = ImageProcessor::new(&PipelineConfig::default());
    let err = processor
        .process(&Source::Blob(b"garbage".to_vec()), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOptions(_)));
}

#[tokio::test]
async fn skip_fallback_is_unused_while_worker_runs() {
    let config = PipelineConfig {
        worker_fallback: WorkerFallback::Skip,
        ..seeded(3)
    };
    let mut processor = ImageProcessor::new(&config);
    let image = gradient(4, 4);
    let out = processor
        .process(&Source::Bitmap(image.clone()), &invert())
        .await
        .unwrap();
    // The worker is alive, so the fallback never kicks in.
    assert!(processor.dispatcher().is_background());
    assert_eq!(out.pixel(1, 1), {
        let p = image.get_pixel(1, 1).0;
        [255 - p[0], 255 - p[1], 255 - p[2], p[3]]
    });
}

#[tokio::test]
async fn batch_keeps_order_and_reports_failures_per_item() {
    let sources = vec![
        Source::Bitmap(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]))),
        Source::Blob(b"not an image".to_vec()),
        Source::Bitmap(RgbaImage::from_pixel(3, 1, Rgba([200, 100, 0, 255]))),
    ];
    let mut processor = ImageProcessor::new(&seeded(4));
    let results = batch::run(&mut processor, &sources, &invert()).await;

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.pixel(0, 0), [245, 235, 225, 255]);
    assert!(matches!(results[1], Err(Error::Decode(_))));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.dimensions(), (3, 1));
    assert_eq!(third.pixel(2, 0), [55, 155, 255, 255]);
}

#[tokio::test]
async fn batch_reads_images_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))
        .save(dir.path().join("b.png"))
        .unwrap();
    RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]))
        .save(dir.path().join("a.png"))
        .unwrap();

    let paths = batch::collect_images(dir.path());
    let sources: Vec<Source> = paths.into_iter().map(Source::Path).collect();
    let mut processor = ImageProcessor::new(&seeded(5));
    let results = batch::run(&mut processor, &sources, &invert()).await;

    let pixels: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().pixel(0, 0))
        .collect();
    assert_eq!(pixels, vec![[0, 0, 0, 255], [255, 255, 255, 255]]);
}

fn encode_gif(frames: Vec<RgbaImage>) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder
            .encode_frames(frames.into_iter().map(Frame::new))
            .unwrap();
    }
    bytes
}

#[tokio::test]
async fn animation_frames_run_through_the_pipeline() {
    let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
    let gif = encode_gif(
        colors
            .iter()
            .map(|c| RgbaImage::from_pixel(4, 4, Rgba(*c)))
            .collect(),
    );
    let mut frames = video::AnimationFrames::from_gif_bytes(&gif).unwrap();
    assert_eq!(frames.len(), 3);

    let mut processor = ImageProcessor::new(&seeded(6));
    let mut seen = Vec::new();
    let count = video::run(
        &mut processor,
        &mut frames,
        &invert(),
        Duration::from_millis(1),
        CancellationToken::new(),
        |index, buffer| seen.push((index, buffer.dimensions(), buffer.pixel(0, 0))),
    )
    .await
    .unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        seen,
        vec![
            (0, (4, 4), [0, 255, 255, 255]),
            (1, (4, 4), [255, 0, 255, 255]),
            (2, (4, 4), [255, 255, 0, 255]),
        ]
    );
}

#[test]
fn garbage_gif_is_a_decode_error() {
    let err = video::AnimationFrames::from_gif_bytes(b"GIF89a?").unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}
