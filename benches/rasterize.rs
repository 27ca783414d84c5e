use block_rasterize::{
    map_links, map_links_threaded, rasterize_polygon, BucketGrid, BucketGridBuilder, DrawMode,
    Polygon, RasterizationOptions, TreeLinks,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 一个n×n的街区网格，每个街区的顶点略微抖动，并且每条边中间多一个顶点
fn blocks(n: usize) -> Vec<Polygon> {
    let mut rng = StdRng::seed_from_u64(1);
    let mut jitter = vec![vec![(0.0, 0.0); n + 1]; n + 1];
    for row in jitter.iter_mut() {
        for cell in row.iter_mut() {
            *cell = (rng.random_range(-0.2..0.2), rng.random_range(-0.2..0.2));
        }
    }
    let corner = |i: usize, j: usize| {
        let (dx, dy) = if i == 0 || j == 0 || i == n || j == n {
            (0.0, 0.0)
        } else {
            jitter[i][j]
        };
        (i as f64 + dx, j as f64 + dy)
    };
    let mid = |a: (f64, f64), b: (f64, f64)| ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);

    let mut polygons = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let (a, b, c, d) = (corner(i, j), corner(i + 1, j), corner(i + 1, j + 1), corner(i, j + 1));
            let ring = vec![a, mid(a, b), b, mid(b, c), c, mid(c, d), d, mid(d, a), a];
            let polygon = Polygon::from_coords(&[ring])
                .expect("valid block")
                .with_block_id(format!("{:04}{:04}", i, j));
            polygons.push(polygon);
        }
    }
    polygons
}

fn grid(polygons: &[Polygon], n: usize) -> BucketGrid {
    let mut grid = BucketGridBuilder::new()
        .bounds(Rect::new((0., 0.), (n as f64, n as f64)))
        .build()
        .expect("valid grid");
    for polygon in polygons {
        grid.add(polygon.clone()).expect("inside grid");
    }
    grid
}

fn rasterize(c: &mut Criterion) {
    let n = 60;
    let polygons = blocks(n);
    let mut ctx = RasterizationOptions::new()
        .bounds(Rect::new((0., 0.), (n as f64, n as f64)))
        .width(1200)
        .height(1200)
        .build()
        .expect("valid options");

    for (name, mode) in [("fill", DrawMode::Fill), ("outline", DrawMode::Outline)] {
        c.bench_function(&format!("rasterize {} {}x{} blocks", name, n, n), |b| {
            b.iter(|| {
                let mut total = 0;
                for polygon in &polygons {
                    rasterize_polygon(black_box(polygon), &mut ctx, mode);
                    total += ctx.pixels().len();
                }
                total
            })
        });
    }
}

fn links(c: &mut Criterion) {
    let n = 60;
    let polygons = blocks(n);
    let grid = grid(&polygons, n);

    c.bench_function("map_links single thread", |b| {
        b.iter(|| {
            let mut links = TreeLinks::new();
            map_links(black_box(&grid), &mut links)
        })
    });
    c.bench_function("map_links 4 threads", |b| {
        b.iter(|| {
            let mut links = TreeLinks::new();
            map_links_threaded(black_box(&grid), &mut links, 4)
        })
    });
}

criterion_group!(benches, rasterize, links);
criterion_main!(benches);
