use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use tiling::{
    CoordinateRemapper, DetectionAggregator, GridConfig, GridPartitioner, RawDetection,
    TileDetections,
};

fn create_test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
}

/// `per_tile` detections with a small square mask in every tile.
fn create_tile_detections(tiles: usize, per_tile: usize, tile_size: u32) -> Vec<TileDetections> {
    let detection = RawDetection {
        class_id: 1,
        class_name: "crack".to_string(),
        confidence: 0.8,
        bbox: [2.0, 2.0, 8.0, 8.0],
        polygon: (0..32)
            .map(|i| [2.0 + (i % 6) as f32, 2.0 + (i / 6) as f32])
            .collect(),
    };

    (0..tiles)
        .map(|_| TileDetections {
            width: tile_size,
            height: tile_size,
            detections: vec![detection.clone(); per_tile],
        })
        .collect()
}

fn benchmark_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    let cases = [(17920, 640, 1, 28), (8192, 8192, 8, 8)];

    for (width, height, rows, cols) in cases.iter() {
        let image = create_test_image(*width, *height);
        let partitioner = GridPartitioner::new(GridConfig::new(*rows, *cols).unwrap()).unwrap();

        group.bench_with_input(
            BenchmarkId::new("grid", format!("{}x{}_{}x{}", width, height, rows, cols)),
            &image,
            |b, image| {
                b.iter(|| partitioner.partition(black_box(image)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_remap_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("remap_aggregate");
    let grid = GridConfig::new(1, 28).unwrap();
    let geometry = tiling::TileGeometry::for_image(grid, 17920, 640).unwrap();
    let remapper = CoordinateRemapper::new(geometry);

    for per_tile in [0, 5, 50].iter() {
        let tiles = create_tile_detections(grid.tile_count(), *per_tile, 640);

        group.bench_with_input(BenchmarkId::new("detections_per_tile", per_tile), &tiles, |b, tiles| {
            b.iter(|| {
                let global = remapper.remap_tiles(black_box(tiles)).unwrap();
                DetectionAggregator.aggregate(global)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_partition, benchmark_remap_aggregate);
criterion_main!(benches);
