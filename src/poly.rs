use geo::Coord;
use log::{debug, trace, warn};

use crate::{Polygon, RasterizationContext};

/// 定义点对类型，表示一条边的两个端点
type PointPair = (Coord<f64>, Coord<f64>);

/// 收集多边形所有非水平的边，每条边按y从小到大排列端点
///
/// 水平边与任何扫描线要么不相交，要么整条重合，对奇偶规则都没有贡献。
fn into_pointpairs(polygon: &Polygon) -> Vec<PointPair> {
    let mut result = Vec::with_capacity(polygon.point_count());
    for (a, b) in polygon.edges() {
        if a.y < b.y {
            result.push((a, b));
        } else if a.y > b.y {
            result.push((b, a));
        }
    }
    result
}

/// 计算扫描线`y`与所有边的交点，写入`ctx`的交点缓冲区
///
/// 一条边只在`lower.y <= y < upper.y`时与扫描线相交（下端点算、上端点不算），
/// 这样两条边共用的、恰好落在扫描线上的顶点只贡献一个交点。
fn intersect_row(edges: &[PointPair], y: f64, ctx: &mut RasterizationContext) {
    ctx.x_intercepts.clear();
    for (lower, upper) in edges {
        if y < lower.y || y >= upper.y {
            continue;
        }
        let x = (y - lower.y) * (upper.x - lower.x) / (upper.y - lower.y) + lower.x;
        ctx.insert_intercept(x);
    }
}

/// 栅格化多边形：取所有像素中心按奇偶规则落在多边形内部的像素
///
/// 主要步骤:
/// 1. 从包围盒顶端对应的行的上一行开始（多扫一行，兜住边界附近的情况）
/// 2. 逐行计算扫描线与所有边的交点，并排序
/// 3. 交点个数为奇数说明几何有问题：记录日志，跳过这一行
/// 4. 对交点两两配对，填充中心落在`[x_lo, x_hi)`内的像素
/// 5. 超过包围盒底端或栅格最后一行时结束
///
/// 像素按行追加到`ctx`的像素缓冲区。
pub fn rasterize_fill(polygon: &Polygon, ctx: &mut RasterizationContext) {
    let bbox = *polygon.bbox();
    let edges = into_pointpairs(polygon);
    if edges.is_empty() {
        return;
    }
    ctx.x_intercepts.reserve(edges.len());

    let mut py = (ctx.row_at_or_below(bbox.max().y) - 1).max(0);

    // 逐行扫描处理
    while (py as usize) < ctx.height() {
        let y = ctx.center_y(py);
        if y < bbox.min().y {
            break;
        }

        intersect_row(&edges, y, ctx);
        if ctx.x_intercepts.len() % 2 != 0 {
            warn!("扫描线 y={} (第{}行) 上的交点个数为奇数，跳过这一行: {}", y, py, polygon);
            debug!("交点: {:?}", ctx.x_intercepts);
            py += 1;
            continue;
        }

        // 缓冲区暂时移出，填充像素时要可变借用ctx
        let xs = std::mem::take(&mut ctx.x_intercepts);
        for pair in xs.chunks_exact(2) {
            let (x_lo, x_hi) = (pair[0], pair[1]);
            let mut px = ctx.column_at_or_right(x_lo).max(0);
            let first = px;
            while (px as usize) < ctx.width() && ctx.center_x(px) < x_hi {
                ctx.add_pixel(px, py);
                px += 1;
            }
            if px == first {
                trace!("区间 [{}, {}) 在第{}行没有覆盖任何像素中心", x_lo, x_hi, py);
            }
        }
        ctx.x_intercepts = xs;

        py += 1;
    }
}

#[cfg(test)]
mod tests {
    use geo::Rect;
    use pretty_assertions::assert_eq;

    use super::*;

    fn context(size: usize) -> RasterizationContext {
        RasterizationContext::new(Rect::new((0., 0.), (size as f64, size as f64)), size, size)
            .unwrap()
    }

    #[test]
    fn vertex_on_scanline_keeps_parity() {
        // 菱形的上下两个顶点恰好落在像素中心所在的扫描线上
        let diamond = Polygon::from_coords(&[vec![
            (2.0, 0.5),
            (3.5, 2.0),
            (2.0, 3.5),
            (0.5, 2.0),
            (2.0, 0.5),
        ]])
        .unwrap();
        let mut ctx = context(4);
        let edges = into_pointpairs(&diamond);
        intersect_row(&edges, 2.5, &mut ctx);
        assert_eq!(ctx.x_intercepts, vec![1.0, 3.0]);
        // 左右顶点：一条边进、一条边出，只算一个交点
        intersect_row(&edges, 2.0, &mut ctx);
        assert_eq!(ctx.x_intercepts, vec![0.5, 3.5]);
        // 底部顶点：两条边都从这里出发，两个相同的交点互相抵消
        intersect_row(&edges, 0.5, &mut ctx);
        assert!(ctx.x_intercepts.is_empty());
    }

    #[test]
    fn horizontal_edges_are_ignored() {
        let square = Polygon::from_coords(&[vec![(1, 1), (3, 1), (3, 3), (1, 3), (1, 1)]]).unwrap();
        assert_eq!(into_pointpairs(&square).len(), 2);
    }

    #[test]
    fn odd_row_is_skipped_not_fatal() {
        let _ = env_logger::builder().is_test(true).try_init();
        // 一个三角形加上一条孤立的竖线，最底下一行会出现奇数个交点
        let broken = Polygon::from_rings_unchecked(vec![
            vec![(0.0, 0.0), (4.0, 0.0), (2.0, 4.0), (0.0, 0.0)].into(),
            vec![(3.0, 0.0), (3.0, 1.0)].into(),
        ]);
        let mut ctx = context(4);
        rasterize_fill(&broken, &mut ctx);
        assert_eq!(ctx.pixels(), &[(1, 1), (2, 1), (1, 2), (2, 2)]);
    }
}
