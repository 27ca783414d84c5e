use geo::Coord;

use crate::{Polygon, RasterizationContext};

/// 把一条边的世界坐标端点换算为包含它的像素
fn to_pixel(c: Coord<f64>, ctx: &RasterizationContext) -> (isize, isize) {
    (ctx.column_containing(c.x), ctx.row_containing(c.y))
}

/// 用整数Bresenham算法在像素坐标`(x0, y0)`与`(x1, y1)`之间画线
///
/// 内循环只有整数运算：陡峭的线先交换两个坐标轴，保证每一步x恰好前进1，
/// 误差项决定y何时前进一格。两个端点都会被画出。
fn draw_line(
    (mut x0, mut y0): (isize, isize),
    (mut x1, mut y1): (isize, isize),
    ctx: &mut RasterizationContext,
) {
    let steep = (y1 - y0).abs() > (x1 - x0).abs();
    if steep {
        std::mem::swap(&mut x0, &mut y0);
        std::mem::swap(&mut x1, &mut y1);
    }
    if x0 > x1 {
        std::mem::swap(&mut x0, &mut x1);
        std::mem::swap(&mut y0, &mut y1);
    }

    let dx = x1 - x0;
    let dy = (y1 - y0).abs();
    let ystep = if y0 < y1 { 1 } else { -1 };
    let mut error = dx / 2;
    let mut y = y0;

    for x in x0..=x1 {
        if steep {
            ctx.add_pixel(y, x);
        } else {
            ctx.add_pixel(x, y);
        }
        error -= dy;
        if error < 0 {
            y += ystep;
            error += dx;
        }
    }
}

/// 只画出多边形的边界
///
/// 对每个环的每一条边，取两个端点所在的像素，用[draw_line]把中间经过的像素全部追加到`ctx`。
/// 相邻两条边共用的端点会被画两次，接收器需要自己去重。
///
/// 落在栅格外恰好一格的端点（例如正好在`max_x`上的顶点）按[RasterizationContext]的约定被丢弃。
pub fn rasterize_outline(polygon: &Polygon, ctx: &mut RasterizationContext) {
    for (start, end) in polygon.edges() {
        let p0 = to_pixel(start, ctx);
        let p1 = to_pixel(end, ctx);
        draw_line(p0, p1, ctx);
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
    fn shallow_line_steps_once_per_column() {
        let mut ctx = context(8);
        draw_line((0, 0), (6, 3), &mut ctx);
        assert_eq!(
            ctx.pixels(),
            &[(0, 0), (1, 0), (2, 1), (3, 1), (4, 2), (5, 2), (6, 3)]
        );
    }

    #[test]
    fn steep_line_steps_once_per_row() {
        let mut ctx = context(8);
        draw_line((1, 5), (0, 0), &mut ctx);
        assert_eq!(ctx.pixels().len(), 6);
        let rows: Vec<u32> = ctx.pixels().iter().map(|&(_, y)| y).collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn fence_endpoints_are_dropped() {
        // 顶点(4, 0)落在第4列、第4行，都恰好在4x4栅格外一格
        let mut ctx = context(4);
        draw_line((0, 4), (4, 4), &mut ctx);
        assert!(ctx.pixels().is_empty());
    }
}
