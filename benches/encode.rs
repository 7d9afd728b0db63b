use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use facechat::{FaceEncoder, PoolingEmbedder, Preprocessor, utils};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array1, Array2};

fn test_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn benchmark_encode(c: &mut Criterion) {
    let img = test_image();
    let bytes = {
        let mut buf = std::io::Cursor::new(vec![]);
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    };
    let encoder =
        FaceEncoder::new(Preprocessor::default(), Box::new(PoolingEmbedder::new(8))).unwrap();

    let mut group = c.benchmark_group("人脸编码");
    group.throughput(Throughput::Elements(1));
    group.bench_function("预处理", |b| b.iter(|| encoder.preprocessor().apply(black_box(&img))));
    group.bench_function("编码", |b| b.iter(|| encoder.encode_image(black_box(&img))));
    group.bench_function("PNG 解码 + 编码", |b| b.iter(|| encoder.encode_bytes(black_box(&bytes))));
    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let dim = 192;
    let mut group = c.benchmark_group("余弦相似度");
    for n in [100, 1000, 10000] {
        let matrix = Array2::from_shape_fn((n, dim), |(i, j)| ((i * 31 + j * 7) % 97) as f32);
        let query = Array1::from_shape_fn(dim, |j| (j % 13) as f32);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| utils::cosine_similarities(black_box(matrix.view()), black_box(query.view())))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_search);
criterion_main!(benches);
