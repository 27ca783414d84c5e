use std::collections::{BTreeMap, BTreeSet};

use geo::Rect;
use proptest::prelude::*;

use crate::{
    map_links, map_links_threaded, rasterize_polygon, BucketGridBuilder, DrawMode, Polygon,
    RasterizationContext, TreeLinks,
};

fn context(size: usize) -> RasterizationContext {
    RasterizationContext::new(Rect::new((0., 0.), (10., 10.)), size, size).unwrap()
}

/// 按奇偶规则判断点是否在多边形内，边的取舍规则与扫描线填充相同
fn even_odd_contains(polygon: &Polygon, x: f64, y: f64) -> bool {
    let mut inside = false;
    for (a, b) in polygon.edges() {
        let (lower, upper) = match a.y.partial_cmp(&b.y) {
            Some(std::cmp::Ordering::Less) => (a, b),
            Some(std::cmp::Ordering::Greater) => (b, a),
            _ => continue,
        };
        if y < lower.y || y >= upper.y {
            continue;
        }
        let xi = (y - lower.y) * (upper.x - lower.x) / (upper.y - lower.y) + lower.x;
        if xi <= x {
            inside = !inside;
        }
    }
    inside
}

fn closed_ring(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.push(points[0]);
    points
}

prop_compose! {
    /// 圆上按角度排好序的点组成的凸多边形
    fn convex_polygon()(
        cx in 3.0..7.0f64,
        cy in 3.0..7.0f64,
        r in 0.5..2.9f64,
        angles in prop::collection::vec(0.0..std::f64::consts::TAU, 3..12),
    ) -> Polygon {
        let mut angles = angles;
        angles.sort_by(|a, b| a.total_cmp(b));
        angles.dedup();
        let points = angles
            .iter()
            .map(|t| (cx + r * t.cos(), cy + r * t.sin()))
            .collect();
        Polygon::from_coords(&[closed_ring(points)]).unwrap()
    }
}

prop_compose! {
    /// 任意顺序的顶点，可能自相交
    fn any_polygon()(
        points in prop::collection::vec((0.3..9.7f64, 0.3..9.7f64), 3..9),
    ) -> Polygon {
        Polygon::from_coords(&[closed_ring(points)]).unwrap()
    }
}

proptest! {
    #[test]
    fn convex_polygons_fill_one_run_per_row(polygon in convex_polygon(), size in 8..64usize) {
        let mut ctx = context(size);
        rasterize_polygon(&polygon, &mut ctx, DrawMode::Fill);

        let mut rows: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for &(x, y) in ctx.pixels() {
            rows.entry(y).or_default().push(x);
        }
        let bbox = *polygon.bbox();
        for (&row, xs) in &rows {
            for pair in xs.windows(2) {
                prop_assert_eq!(pair[1], pair[0] + 1);
            }
            let cy = ctx.center_y(row as isize);
            prop_assert!(cy >= bbox.min().y && cy <= bbox.max().y);
        }
    }

    #[test]
    fn fill_agrees_with_even_odd_rule(polygon in any_polygon(), size in 4..40usize) {
        let mut ctx = context(size);
        rasterize_polygon(&polygon, &mut ctx, DrawMode::Fill);
        let filled: BTreeSet<(u32, u32)> = ctx.pixels().iter().copied().collect();
        prop_assert_eq!(filled.len(), ctx.pixels().len());

        let mut expected = BTreeSet::new();
        for py in 0..size {
            for px in 0..size {
                let (cx, cy) = (ctx.center_x(px as isize), ctx.center_y(py as isize));
                if even_odd_contains(&polygon, cx, cy) {
                    expected.insert((px as u32, py as u32));
                }
            }
        }
        prop_assert_eq!(filled, expected);
    }

    #[test]
    fn outline_stays_in_bbox(polygon in any_polygon(), size in 4..40usize) {
        let mut ctx = context(size);
        rasterize_polygon(&polygon, &mut ctx, DrawMode::Outline);
        prop_assert!(!ctx.pixels().is_empty());
        let bbox = *polygon.bbox();
        let pw = ctx.pixel_width();
        for &(x, y) in ctx.pixels() {
            let (cx, cy) = (ctx.center_x(x as isize), ctx.center_y(y as isize));
            prop_assert!(cx >= bbox.min().x - pw && cx <= bbox.max().x + pw);
            prop_assert!(cy >= bbox.min().y - pw && cy <= bbox.max().y + pw);
        }
    }

    #[test]
    fn two_shared_vertices_link_exactly_once(
        x in 0.0..8.0f64,
        y in 0.0..8.0f64,
        s in 0.1..2.0f64,
        cells in 1..30usize,
    ) {
        let (x1, y1) = (x + s, y + s);
        let (x2, y2) = (x1 + s, y1 + s);
        let square = |x0: f64, y0: f64, x1: f64, y1: f64, id: &str| {
            Polygon::from_coords(&[vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]])
                .unwrap()
                .with_block_id(id)
        };
        let mut grid = BucketGridBuilder::new()
            .bounds(Rect::new((0., 0.), (12., 12.)))
            .width(cells)
            .height(cells)
            .build()
            .unwrap();
        grid.add(square(x, y, x1, y1, "a")).unwrap();
        // 与a共享一条边
        grid.add(square(x1, y, x2, y1, "b")).unwrap();
        // 与a只共享一个角点，与b共享一条边；环从(x2, y1)开始，共享角点只出现一次
        let c = Polygon::from_coords(&[vec![(x2, y1), (x2, y2), (x1, y2), (x1, y1), (x2, y1)]])
            .unwrap()
            .with_block_id("c");
        grid.add(c).unwrap();

        let mut links = TreeLinks::new();
        prop_assert_eq!(map_links(&grid, &mut links), 2);
        prop_assert!(links.contains(b"a", b"b"));
        prop_assert!(links.contains(b"b", b"c"));
        prop_assert!(!links.contains(b"a", b"c"));
    }

    #[test]
    fn threads_do_not_change_links(
        present in prop::collection::vec(any::<bool>(), 25),
        cells in 1..10usize,
        threads in 2..8usize,
    ) {
        let mut grid = BucketGridBuilder::new()
            .bounds(Rect::new((0., 0.), (5., 5.)))
            .width(cells)
            .height(cells)
            .build()
            .unwrap();
        for (i, _) in present.iter().enumerate().filter(|(_, keep)| **keep) {
            let (x, y) = ((i % 5) as f64, (i / 5) as f64);
            let ring = closed_ring(vec![(x, y), (x + 1., y), (x + 1., y + 1.), (x, y + 1.)]);
            let polygon = Polygon::from_coords(&[ring])
                .unwrap()
                .with_block_id(format!("{:02}", i));
            grid.add(polygon).unwrap();
        }

        let mut single = TreeLinks::new();
        let mut threaded = TreeLinks::new();
        let single_count = map_links(&grid, &mut single);
        let threaded_count = map_links_threaded(&grid, &mut threaded, threads);
        prop_assert_eq!(single_count, threaded_count);
        prop_assert_eq!(single, threaded);
    }
}
