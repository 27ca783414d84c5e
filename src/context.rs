use std::cmp::Ordering;

use geo::{Coord, Rect};
use log::error;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 栅格化配置，用于构造[RasterizationContext]实例。
///
/// 世界坐标范围的四条边可以分别显式设置；没有显式设置的边取自
/// [RasterizationOptions::increase_bounds]累积的数据范围，这样同一张栅格可以覆盖多个输入数据集。
/// 显式设置的部分可以通过serde保存和读取（例如JSON配置文件）。
///
/// # 示例
///
/// ```rust
/// # fn main() -> block_rasterize::Result<()> {
/// use block_rasterize::RasterizationOptions;
/// use geo::Rect;
///
/// let ctx = RasterizationOptions::new()
///     .bounds(Rect::new((0., 0.), (4., 2.)))
///     .width(40)
///     .height(20)
///     .build()?;
/// assert_eq!(ctx.pixel_width(), 0.1);
/// # Ok(())}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizationOptions {
    /// 显式设置的最小x
    min_x: Option<f64>,
    /// 显式设置的最小y
    min_y: Option<f64>,
    /// 显式设置的最大x
    max_x: Option<f64>,
    /// 显式设置的最大y
    max_y: Option<f64>,
    /// 输出栅格的宽度（像素数）
    width: Option<usize>,
    /// 输出栅格的高度（像素数）
    height: Option<usize>,
    /// 所有输入数据集范围的并集
    #[serde(skip)]
    data_bounds: Option<Rect<f64>>,
}

impl RasterizationOptions {
    pub fn new() -> Self {
        RasterizationOptions::default()
    }

    /// 显式设置全部四条边
    pub fn bounds(mut self, bounds: Rect<f64>) -> Self {
        self.min_x = Some(bounds.min().x);
        self.min_y = Some(bounds.min().y);
        self.max_x = Some(bounds.max().x);
        self.max_y = Some(bounds.max().y);
        self
    }

    pub fn min_x(mut self, min_x: f64) -> Self {
        self.min_x = Some(min_x);
        self
    }

    pub fn min_y(mut self, min_y: f64) -> Self {
        self.min_y = Some(min_y);
        self
    }

    pub fn max_x(mut self, max_x: f64) -> Self {
        self.max_x = Some(max_x);
        self
    }

    pub fn max_y(mut self, max_y: f64) -> Self {
        self.max_y = Some(max_y);
        self
    }

    /// 设置输出栅格的宽度
    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// 设置输出栅格的高度
    pub fn height(mut self, height: usize) -> Self {
        self.height = Some(height);
        self
    }

    /// 把一个数据集的范围并入数据范围
    ///
    /// 显式设置过的边不受影响。
    pub fn increase_bounds(&mut self, extent: &Rect<f64>) {
        self.data_bounds = Some(match self.data_bounds {
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
    }

    /// 最终使用的世界坐标范围：显式设置的边优先，其余取自数据范围
    ///
    /// # 错误
    /// * [Error::MissingBounds] - 某条边既没有显式设置，也没有数据范围
    /// * [Error::NonFiniteCoordinate] - 某条边不是有限值
    /// * [Error::EmptyBounds] - max <= min
    pub fn resolved_bounds(&self) -> Result<Rect<f64>> {
        let data = self.data_bounds;
        let min_x = self.min_x.or(data.map(|r| r.min().x));
        let min_y = self.min_y.or(data.map(|r| r.min().y));
        let max_x = self.max_x.or(data.map(|r| r.max().x));
        let max_y = self.max_y.or(data.map(|r| r.max().y));
        match (min_x, min_y, max_x, max_y) {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
                    return Err(Error::NonFiniteCoordinate);
                }
                if max_x <= min_x || max_y <= min_y {
                    return Err(Error::EmptyBounds);
                }
                Ok(Rect::new((min_x, min_y), (max_x, max_y)))
            }
            _ => Err(Error::MissingBounds),
        }
    }

    /// 在分辨率未设置时，选出能放进`bound_x × bound_y`的最大栅格尺寸，并保持长宽比
    ///
    /// `projected`为false时认为坐标是经纬度，宽度按中间纬度的余弦缩短。
    /// 宽和高都已设置时什么也不做。
    pub fn update_pixel_size(&mut self, bound_x: usize, bound_y: usize, projected: bool) -> Result<()> {
        if self.width.is_some() && self.height.is_some() {
            return Ok(());
        }
        if bound_x == 0 || bound_y == 0 {
            return Err(Error::EmptyBounds);
        }
        let bounds = self.resolved_bounds()?;
        let width = bounds.width();
        let height = bounds.height();
        let scaled_width = if projected {
            width
        } else {
            let mid_latitude = (bounds.max().y + bounds.min().y) / 2.0;
            width * mid_latitude.abs().to_radians().cos()
        };
        let ratio = height / scaled_width;
        let bound_ratio = bound_y as f64 / bound_x as f64;
        let (xpx, ypx) = if ratio > bound_ratio {
            // 太高了，以高度为准
            (((bound_y as f64) / ratio) as usize, bound_y)
        } else {
            (bound_x, (ratio * bound_x as f64) as usize)
        };
        self.width = Some(xpx.max(1));
        self.height = Some(ypx.max(1));
        Ok(())
    }

    /// 根据当前配置构建栅格化上下文
    ///
    /// # 错误
    /// 缺少宽度、高度或坐标范围，或者它们为空时返回相应的错误
    pub fn build(&self) -> Result<RasterizationContext> {
        match (self.width, self.height) {
            (None, _) => Err(Error::MissingWidth),
            (_, None) => Err(Error::MissingHeight),
            (Some(width), Some(height)) => {
                RasterizationContext::new(self.resolved_bounds()?, width, height)
            }
        }
    }
}

/// 一轮栅格化的可变状态
///
/// 包括栅格的几何参数、当前扫描线的x交点缓冲区，以及当前多边形覆盖的像素。
/// 整轮只创建一个实例；每处理一个多边形之前像素缓冲区会被清空，两个缓冲区都按需增长、重复使用。
///
/// 世界坐标的y轴向上，栅格的第0行在最上面（世界坐标`max_y`处）。
/// 像素`(px, py)`的中心位于：
/// * `center_x(px) = min_x + (px + 0.5) * pixel_width`
/// * `center_y(py) = max_y - (py + 0.5) * pixel_height`
#[derive(Debug, Clone)]
pub struct RasterizationContext {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    width: usize,
    height: usize,
    pixel_width: f64,
    pixel_height: f64,
    /// 当前扫描线上已排序的x交点
    pub(crate) x_intercepts: Vec<f64>,
    /// 当前多边形覆盖的像素
    pixels: Vec<(u32, u32)>,
}

impl RasterizationContext {
    /// 创建一个新的栅格化上下文
    ///
    /// # 参数
    /// * `bounds` - 栅格覆盖的世界坐标范围
    /// * `width` - 栅格宽度（像素）
    /// * `height` - 栅格高度（像素）
    pub fn new(bounds: Rect<f64>, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyBounds);
        }
        if u32::try_from(width).is_err() || u32::try_from(height).is_err() {
            return Err(Error::RasterTooLarge { width, height });
        }
        let mut ctx = RasterizationContext {
            min_x: 0.,
            min_y: 0.,
            max_x: 0.,
            max_y: 0.,
            width,
            height,
            pixel_width: 0.,
            pixel_height: 0.,
            x_intercepts: Vec::with_capacity(100),
            pixels: Vec::with_capacity(100),
        };
        ctx.set_bounds(bounds)?;
        Ok(ctx)
    }

    /// 更换世界坐标范围，像素尺寸随之重新计算
    pub fn set_bounds(&mut self, bounds: Rect<f64>) -> Result<()> {
        let (min, max) = (bounds.min(), bounds.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(Error::NonFiniteCoordinate);
        }
        if max.x <= min.x || max.y <= min.y {
            return Err(Error::EmptyBounds);
        }
        self.min_x = min.x;
        self.min_y = min.y;
        self.max_x = max.x;
        self.max_y = max.y;
        self.pixel_width = (self.max_x - self.min_x) / self.width as f64;
        self.pixel_height = (self.max_y - self.min_y) / self.height as f64;
        Ok(())
    }

    pub fn bounds(&self) -> Rect<f64> {
        Rect::new((self.min_x, self.min_y), (self.max_x, self.max_y))
    }

    /// 栅格宽度（像素）
    pub fn width(&self) -> usize {
        self.width
    }

    /// 栅格高度（像素）
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> f64 {
        self.pixel_height
    }

    /// 当前多边形覆盖的像素，`(x, y)`对
    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels
    }

    /// 清空像素缓冲区，保留已分配的容量
    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    /// 第`px`列像素中心的x坐标
    pub fn center_x(&self, px: isize) -> f64 {
        self.min_x + (px as f64 + 0.5) * self.pixel_width
    }

    /// 第`py`行像素中心的y坐标
    pub fn center_y(&self, py: isize) -> f64 {
        self.max_y - (py as f64 + 0.5) * self.pixel_height
    }

    /// 中心x坐标不小于`x`的第一列
    pub(crate) fn column_at_or_right(&self, x: f64) -> isize {
        ((x - self.min_x) / self.pixel_width - 0.5).ceil() as isize
    }

    /// 中心y坐标不大于`y`的第一行
    pub(crate) fn row_at_or_below(&self, y: f64) -> isize {
        ((self.max_y - y) / self.pixel_height - 0.5).ceil() as isize
    }

    /// 包含`x`的像素列
    pub(crate) fn column_containing(&self, x: f64) -> isize {
        ((x - self.min_x) / self.pixel_width).floor() as isize
    }

    /// 包含`y`的像素行
    pub(crate) fn row_containing(&self, y: f64) -> isize {
        ((self.max_y - y) / self.pixel_height).floor() as isize
    }

    /// 把一个交点插入已排序的交点缓冲区
    ///
    /// 同一行上x完全相同的两个交点成对抵消，而不是只保留一个：它们围出的是
    /// 宽度为零的区间，抵消之后交点个数的奇偶性不变。只保留一个会让顶点
    /// 恰好落在扫描线上的行变成奇数个交点。
    pub(crate) fn insert_intercept(&mut self, x: f64) {
        let found = self
            .x_intercepts
            .binary_search_by(|probe| probe.partial_cmp(&x).unwrap_or(Ordering::Less));
        match found {
            Ok(index) => {
                self.x_intercepts.remove(index);
            }
            Err(index) => self.x_intercepts.insert(index, x),
        }
    }

    /// 追加一个像素
    ///
    /// 恰好落在栅格外一格（-1或等于栅格尺寸）的坐标是取整造成的，直接丢弃。
    /// 更远的越界坐标说明几何或计算有缺陷：调试构建中直接断言失败，发布构建中记录错误并丢弃。
    pub(crate) fn add_pixel(&mut self, x: isize, y: isize) {
        let (width, height) = (self.width as isize, self.height as isize);
        if x == -1 || y == -1 || x == width || y == height {
            return;
        }
        debug_assert!(x >= 0 && x < width, "像素x坐标越界: {x}");
        debug_assert!(y >= 0 && y < height, "像素y坐标越界: {y}");
        if x < 0 || x >= width || y < 0 || y >= height {
            error!("丢弃越界像素 ({x}, {y})，栅格尺寸 {width}x{height}");
            return;
        }
        self.pixels.push((x as u32, y as u32));
    }
}
