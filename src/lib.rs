#![doc = include_str!("../README.md")]
use euclid::{Transform2D, UnknownUnit};
use thiserror::Error;

mod adjacency;
mod aggregate;
mod bucket;
mod context;
mod edges;
mod geometry;
mod line;
mod poly;
mod receiver;
mod record;

pub use adjacency::{
    canonical_pair, link_polygon, map_links, map_links_threaded, write_links, HashLinks, SetLink,
    SynchronizedLinks, TreeLinks,
};
pub use aggregate::{parse_ubid, BlockAggregator, BlockHolder, BlockKey, BlockRecord};
pub use bucket::{BucketGrid, BucketGridBuilder, DEFAULT_GRID_SIZE};
pub use context::{RasterizationContext, RasterizationOptions};
pub use edges::{EdgeLinker, EdgeRecord};
pub use geometry::{PolyLine, Polygon};
pub use receiver::{
    BlockRecordReceiver, MaskColors, MaskOptions, MaskReceiver, RasterizationReceiver,
};
pub use record::BlockRaster;

#[cfg(test)]
mod proptests;

/// 仿射变换，用于在栅格化之前就地改写多边形的坐标（例如外部投影服务给出的近似变换）。
pub type Transform = Transform2D<f64, UnknownUnit, UnknownUnit>;

/// 本库的错误类型
///
/// 只有结构性错误（配置不完整、上游记录不合法、调用约定被违反、I/O失败）会以错误形式返回。
/// 几何上的不一致（某条扫描线上交点个数为奇数等）只记录日志，不会中断整个批处理。
#[derive(Error, Debug)]
pub enum Error {
    /// 提供的几何图形或变换中至少有一个坐标是NaN或无限的
    #[error("提供的几何图形中至少有一个坐标是NaN或无限的")]
    NonFiniteCoordinate,

    /// 构建器中缺少必需的`width`参数
    #[error("构建器中缺少必需的`width`参数")]
    MissingWidth,

    /// 构建器中缺少必需的`height`参数
    #[error("构建器中缺少必需的`height`参数")]
    MissingHeight,

    /// 构建器中缺少世界坐标范围
    #[error("构建器中缺少世界坐标范围")]
    MissingBounds,

    /// 坐标范围为空（max <= min）或分辨率为零
    #[error("坐标范围或分辨率为空")]
    EmptyBounds,

    /// 栅格尺寸超出了像素坐标（u32）能表示的范围
    #[error("栅格尺寸 {width}x{height} 过大")]
    RasterTooLarge { width: usize, height: usize },

    /// 多边形没有任何环
    #[error("多边形没有任何环")]
    EmptyPolygon,

    /// 第`ring`个环没有闭合（首点不等于末点）
    #[error("第{ring}个环没有闭合")]
    UnclosedRing { ring: usize },

    /// 第`ring`个环的点数少于4个（3个不同的点加上闭合点）
    #[error("第{ring}个环的点数不足")]
    DegenerateRing { ring: usize },

    /// 多边形的包围盒不在桶网格的范围内
    #[error("多边形的包围盒不在桶网格的范围内")]
    OutsideGrid,

    /// 数值街区键与原始字节街区键被拿来比较
    #[error("数值街区键与原始字节街区键不能比较")]
    KeyKindMismatch,

    /// 把一个片段合并进了另一个街区的暂存记录
    #[error("街区键不一致：暂存的是 {held}，收到的是 {given}")]
    BlockKeyMismatch { held: String, given: String },

    /// 接收器的缓冲区尺寸与栅格尺寸不符
    #[error("缓冲区尺寸 {have:?} 与栅格尺寸 {want:?} 不符")]
    SizeMismatch {
        have: (usize, usize),
        want: (usize, usize),
    },

    /// 街区栅格文件格式错误
    #[error("街区栅格文件格式错误: {0}")]
    BadRecordFile(String),

    /// 底层I/O错误
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 本库使用的结果类型，使用[Error]作为错误类型。
pub type Result<T> = std::result::Result<T, Error>;

/// 多边形的绘制方式
///
/// 每次运行只选择一次：要么填充整个多边形，要么只画出它的边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    /// 扫描线填充：按奇偶规则取所有像素中心落在多边形内部的像素
    #[default]
    Fill,

    /// 只画边界：用整数Bresenham算法画出每一条边
    Outline,
}

impl DrawMode {
    /// 按当前模式把`polygon`覆盖的像素追加到`ctx`的像素缓冲区
    pub fn draw(self, polygon: &Polygon, ctx: &mut RasterizationContext) {
        match self {
            DrawMode::Fill => poly::rasterize_fill(polygon, ctx),
            DrawMode::Outline => line::rasterize_outline(polygon, ctx),
        }
    }
}

/// 栅格化单个多边形
///
/// 先清空`ctx`中上一个多边形留下的像素，再按`mode`重新填充。
/// 结果可以通过[RasterizationContext::pixels]读取。
///
/// # 示例
///
/// ```rust
/// # fn main() -> block_rasterize::Result<()> {
/// use block_rasterize::{rasterize_polygon, DrawMode, Polygon, RasterizationOptions};
/// use geo::Rect;
///
/// let mut ctx = RasterizationOptions::new()
///     .bounds(Rect::new((0., 0.), (10., 10.)))
///     .width(10)
///     .height(10)
///     .build()?;
/// let square = Polygon::from_coords(&[vec![(0., 0.), (1., 0.), (1., 1.), (0., 1.), (0., 0.)]])?;
///
/// rasterize_polygon(&square, &mut ctx, DrawMode::Fill);
/// assert_eq!(ctx.pixels(), &[(0, 9)]);
/// # Ok(())}
/// ```
pub fn rasterize_polygon(polygon: &Polygon, ctx: &mut RasterizationContext, mode: DrawMode) {
    ctx.clear();
    mode.draw(polygon, ctx);
}

/// 依次栅格化一组多边形，并把每个多边形的像素交给所有接收器
///
/// 每个接收器先收到一次`set_size`，然后每个多边形收到一次`set_rasterized_polygon`。
/// `limit`用于调试：处理了这么多个多边形之后就停下。
///
/// # 返回值
/// 实际处理的多边形个数
///
/// # 错误
/// 接收器返回的任何错误都会立刻终止这一轮处理
pub fn rasterize_polygons<'a, I>(
    polygons: I,
    ctx: &mut RasterizationContext,
    mode: DrawMode,
    receivers: &mut [&mut dyn RasterizationReceiver],
    limit: Option<usize>,
) -> Result<usize>
where
    I: IntoIterator<Item = &'a Polygon>,
{
    for receiver in receivers.iter_mut() {
        receiver.set_size(ctx.width(), ctx.height())?;
    }

    let mut processed = 0;
    for polygon in polygons {
        if limit.map_or(false, |limit| processed >= limit) {
            break;
        }
        rasterize_polygon(polygon, ctx, mode);
        for receiver in receivers.iter_mut() {
            receiver.set_rasterized_polygon(ctx, polygon)?;
        }
        processed += 1;
    }

    Ok(processed)
}
