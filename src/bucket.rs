use std::ops::RangeInclusive;

use geo::{Coord, Rect};

use crate::geometry::rects_touch;
use crate::{Error, Polygon, Result};

/// 桶网格默认的每边格数
pub const DEFAULT_GRID_SIZE: usize = 20;

/// 桶网格构建器
///
/// 世界坐标范围可以在构建前多次扩大（一张栅格覆盖多个输入数据集时），
/// 构建之后范围就固定了。
#[derive(Debug, Clone)]
pub struct BucketGridBuilder {
    bounds: Option<Rect<f64>>,
    width: usize,
    height: usize,
}

impl Default for BucketGridBuilder {
    fn default() -> Self {
        BucketGridBuilder {
            bounds: None,
            width: DEFAULT_GRID_SIZE,
            height: DEFAULT_GRID_SIZE,
        }
    }
}

impl BucketGridBuilder {
    pub fn new() -> Self {
        BucketGridBuilder::default()
    }

    /// 设置网格覆盖的世界坐标范围，覆盖之前的设置
    pub fn bounds(mut self, bounds: Rect<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// 把范围扩大到同时覆盖`extent`
    pub fn grow_bounds(mut self, extent: &Rect<f64>) -> Self {
        self.bounds = Some(match self.bounds {
            None => *extent,
            Some(current) => Rect::new(
                Coord {
                    x: current.min().x.min(extent.min().x),
                    y: current.min().y.min(extent.min().y),
                },
                Coord {
                    x: current.max().x.max(extent.max().x),
                    y: current.max().y.max(extent.max().y),
                },
            ),
        });
        self
    }

    /// x方向的格数
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// y方向的格数
    pub fn height(mut self, height: usize) -> Self {
        self.height = height;
        self
    }

    /// 构建空的桶网格
    ///
    /// # 错误
    /// * [Error::MissingBounds] - 没有设置范围
    /// * [Error::NonFiniteCoordinate] - 范围不是有限值
    /// * [Error::EmptyBounds] - 范围为空或格数为零
    pub fn build(self) -> Result<BucketGrid> {
        let bounds = self.bounds.ok_or(Error::MissingBounds)?;
        let (min, max) = (bounds.min(), bounds.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(Error::NonFiniteCoordinate);
        }
        if max.x <= min.x || max.y <= min.y || self.width == 0 || self.height == 0 {
            return Err(Error::EmptyBounds);
        }
        Ok(BucketGrid {
            bounds,
            width: self.width,
            height: self.height,
            cells: vec![Vec::new(); self.width * self.height],
            polygons: Vec::new(),
        })
    }
}

/// 按包围盒登记多边形的均匀网格空间索引
///
/// 网格持有所有多边形，格子里只存多边形的编号（加入的顺序）。
/// 一个多边形登记在它的包围盒覆盖的每一个格子里。
/// 邻接检测期间网格是只读的，可以被多个线程同时借用。
#[derive(Debug, Clone)]
pub struct BucketGrid {
    bounds: Rect<f64>,
    width: usize,
    height: usize,
    /// 第`(ix, iy)`格位于`ix * height + iy`
    cells: Vec<Vec<usize>>,
    polygons: Vec<Polygon>,
}

impl BucketGrid {
    pub fn bounds(&self) -> &Rect<f64> {
        &self.bounds
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// x坐标所在的格子列，正好落在`max_x`上的坐标归入最后一列
    pub fn bucket_x(&self, x: f64) -> usize {
        let (min, max) = (self.bounds.min().x, self.bounds.max().x);
        bucket_index(x, min, max, self.width)
    }

    /// y坐标所在的格子行，正好落在`max_y`上的坐标归入最后一行
    pub fn bucket_y(&self, y: f64) -> usize {
        let (min, max) = (self.bounds.min().y, self.bounds.max().y);
        bucket_index(y, min, max, self.height)
    }

    /// 与`rect`相交的格子范围，`rect`完全在网格外时返回None
    fn cell_range(&self, rect: &Rect<f64>) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
        if !rects_touch(&self.bounds, rect) {
            return None;
        }
        let xs = self.bucket_x(rect.min().x)..=self.bucket_x(rect.max().x);
        let ys = self.bucket_y(rect.min().y)..=self.bucket_y(rect.max().y);
        Some((xs, ys))
    }

    /// 登记一个多边形
    ///
    /// # 返回值
    /// 多边形在网格中的编号
    ///
    /// # 错误
    /// 多边形的包围盒不完全在网格范围内时返回[Error::OutsideGrid]
    pub fn add(&mut self, polygon: Polygon) -> Result<usize> {
        let bbox = *polygon.bbox();
        let (min, max) = (self.bounds.min(), self.bounds.max());
        if bbox.min().x < min.x || bbox.min().y < min.y || bbox.max().x > max.x || bbox.max().y > max.y {
            return Err(Error::OutsideGrid);
        }
        let id = self.polygons.len();
        self.polygons.push(polygon);
        if let Some((xs, ys)) = self.cell_range(&bbox) {
            for ix in xs {
                for iy in ys.clone() {
                    self.cells[ix * self.height + iy].push(id);
                }
            }
        }
        Ok(id)
    }

    /// 第`(ix, iy)`格中登记的多边形编号
    pub fn cell(&self, ix: usize, iy: usize) -> &[usize] {
        if ix >= self.width || iy >= self.height {
            return &[];
        }
        &self.cells[ix * self.height + iy]
    }

    /// 与`rect`相交的所有格子
    pub fn cells_overlapping(&self, rect: &Rect<f64>) -> impl Iterator<Item = &[usize]> + '_ {
        let range = self.cell_range(rect);
        range.into_iter().flat_map(move |(xs, ys)| {
            xs.flat_map(move |ix| ys.clone().map(move |iy| self.cell(ix, iy)))
        })
    }

    /// 与`rect`相交的格子里登记过的所有多边形编号，排序并去重
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut ids: Vec<usize> = self.cells_overlapping(rect).flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn polygon(&self, id: usize) -> Option<&Polygon> {
        self.polygons.get(id)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// 拆掉网格，取回所有多边形（按加入顺序）
    pub fn into_polygons(self) -> Vec<Polygon> {
        self.polygons
    }
}

fn bucket_index(v: f64, min: f64, max: f64, cells: usize) -> usize {
    let index = (cells as f64 * (v - min) / (max - min)).floor();
    if index <= 0. {
        0
    } else {
        (index as usize).min(cells - 1)
    }
}
