use ahash::AHashSet;
use log::{debug, info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::aggregate::{BlockAggregator, BlockKey, BlockRecord};
use crate::record::BlockRaster;
use crate::{Error, Polygon, RasterizationContext, Result};

/// 栅格化结果的接收端
///
/// 一轮栅格化开始时先调用一次[RasterizationReceiver::set_size]，
/// 之后每栅格化完一个多边形调用一次[RasterizationReceiver::set_rasterized_polygon]，
/// 此时`ctx.pixels()`就是这个多边形覆盖的像素。
pub trait RasterizationReceiver {
    fn set_size(&mut self, width: usize, height: usize) -> Result<()>;

    fn set_rasterized_polygon(&mut self, ctx: &RasterizationContext, polygon: &Polygon) -> Result<()>;
}

/// 轮流使用的调色板（ARGB）
const PALETTE: [u32; 7] = [
    0xff0000ff, 0xff00ff00, 0xffff0000, 0xff00ffff, 0xffff00ff, 0xffffff00, 0xff7f7f7f,
];

/// 掩码图中多边形的着色方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaskColors {
    /// 按多边形顺序轮流使用调色板
    Palette,
    /// 每个多边形一个随机颜色
    #[default]
    Random,
    /// 每个多边形一个随机灰度
    Gray,
}

/// 掩码图的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    pub colors: MaskColors,
    /// 随机颜色的种子，相同的种子得到相同的图
    pub seed: u64,
    /// 水域片段统一使用的颜色（ARGB）
    pub water_color: u32,
    /// 随机颜色每个通道的取值范围是`[random_offset, random_offset + random_range)`
    pub random_range: u32,
    pub random_offset: u32,
}

impl Default for MaskOptions {
    fn default() -> Self {
        MaskOptions {
            colors: MaskColors::default(),
            seed: 0,
            water_color: 0x996666ff,
            random_range: 150,
            random_offset: 10,
        }
    }
}

/// 把每个多边形按一种颜色画进ARGB掩码图
///
/// 掩码图是一个`(height, width)`的[Array2]。哪些像素已经被写过另外记录，
/// 与颜色值无关，所以颜色为0或预先填好的掩码图也能正确计数。
/// 一个像素被第二个多边形再次写入时记为一次冲突；冲突只计数，不会报错。
#[derive(Debug)]
pub struct MaskReceiver {
    options: MaskOptions,
    mask: Option<Array2<u32>>,
    written: Option<Array2<bool>>,
    rng: StdRng,
    polygon_index: usize,
    collisions: usize,
    seen: AHashSet<(u32, u32)>,
}

impl MaskReceiver {
    pub fn new(options: MaskOptions) -> Self {
        MaskReceiver {
            rng: StdRng::seed_from_u64(options.seed),
            options,
            mask: None,
            written: None,
            polygon_index: 0,
            collisions: 0,
            seen: AHashSet::new(),
        }
    }

    /// 画进一个已有的掩码图，之后的`set_size`必须与它的尺寸一致
    pub fn with_buffer(options: MaskOptions, mask: Array2<u32>) -> Self {
        let mut receiver = MaskReceiver::new(options);
        receiver.mask = Some(mask);
        receiver
    }

    /// 到目前为止的冲突像素个数
    pub fn collision_count(&self) -> usize {
        self.collisions
    }

    pub fn mask(&self) -> Option<&Array2<u32>> {
        self.mask.as_ref()
    }

    /// 结束绘制，取出掩码图；没有收到过`set_size`时返回空图
    pub fn finish(self) -> Array2<u32> {
        info!(
            "掩码图画了{}个多边形，{}个像素冲突",
            self.polygon_index, self.collisions
        );
        self.mask.unwrap_or_else(|| Array2::zeros((0, 0)))
    }

    fn random_channel(&mut self) -> u32 {
        let range = self.options.random_range;
        let value = if range == 0 {
            0
        } else {
            self.rng.random_range(0..range)
        };
        (value + self.options.random_offset).min(0xff)
    }

    fn next_color(&mut self, is_water: bool) -> u32 {
        if is_water {
            return self.options.water_color;
        }
        match self.options.colors {
            MaskColors::Palette => PALETTE[self.polygon_index % PALETTE.len()],
            MaskColors::Random => {
                let r = self.random_channel();
                let g = self.random_channel();
                let b = self.random_channel();
                0xff000000 | (r << 16) | (g << 8) | b
            }
            MaskColors::Gray => {
                let v = self.random_channel();
                0xff000000 | (v << 16) | (v << 8) | v
            }
        }
    }
}

impl RasterizationReceiver for MaskReceiver {
    fn set_size(&mut self, width: usize, height: usize) -> Result<()> {
        match &self.mask {
            Some(mask) if mask.dim() != (height, width) => Err(Error::SizeMismatch {
                have: (mask.ncols(), mask.nrows()),
                want: (width, height),
            }),
            Some(_) => Ok(()),
            None => {
                self.mask = Some(Array2::zeros((height, width)));
                Ok(())
            }
        }
    }

    fn set_rasterized_polygon(&mut self, ctx: &RasterizationContext, polygon: &Polygon) -> Result<()> {
        let color = self.next_color(polygon.is_water());
        let want = (ctx.width(), ctx.height());
        let Some(mask) = self.mask.as_mut() else {
            return Err(Error::SizeMismatch { have: (0, 0), want });
        };
        let have = (mask.ncols(), mask.nrows());
        let written = self
            .written
            .get_or_insert_with(|| Array2::from_elem(mask.dim(), false));

        // 同一个多边形重复给出的像素（例如边界模式下相邻边共用的端点）不算冲突
        self.seen.clear();
        for &(x, y) in ctx.pixels() {
            if !self.seen.insert((x, y)) {
                continue;
            }
            let cell = mask
                .get_mut((y as usize, x as usize))
                .ok_or(Error::SizeMismatch { have, want })?;
            let was_written = written
                .get_mut((y as usize, x as usize))
                .ok_or(Error::SizeMismatch { have, want })?;
            if *was_written {
                self.collisions += 1;
            }
            *was_written = true;
            *cell = color;
        }
        self.polygon_index += 1;
        Ok(())
    }
}

/// 收集每个街区的像素，生成[BlockRaster]
///
/// `optimize`为true时，同一街区的多个片段先在[BlockAggregator]里合并成一条记录；
/// 否则每个多边形直接生成一条记录。
#[derive(Debug)]
pub struct BlockRecordReceiver {
    width: usize,
    height: usize,
    aggregator: Option<BlockAggregator>,
    records: Vec<BlockRecord>,
    land_pixels_in: usize,
}

impl BlockRecordReceiver {
    pub fn new(optimize: bool) -> Self {
        BlockRecordReceiver {
            width: 0,
            height: 0,
            aggregator: optimize.then(BlockAggregator::new),
            records: Vec::new(),
            land_pixels_in: 0,
        }
    }

    /// 结束处理，按键的顺序给出所有合并后的记录（非合并模式下保持收到的顺序）
    pub fn finish(self) -> BlockRaster {
        let records = match self.aggregator {
            Some(aggregator) => {
                let land_in = aggregator.land_pixels_in();
                let records = aggregator.into_records();
                let land_out: usize = records.iter().map(|record| record.land.len()).sum();
                info!(
                    "收到{}个陆地像素，合并为{}个街区后输出{}个",
                    land_in,
                    records.len(),
                    land_out
                );
                records
            }
            None => {
                info!(
                    "收到{}个陆地像素，{}条街区记录",
                    self.land_pixels_in,
                    self.records.len()
                );
                self.records
            }
        };
        BlockRaster {
            width: self.width,
            height: self.height,
            records,
        }
    }
}

impl RasterizationReceiver for BlockRecordReceiver {
    fn set_size(&mut self, width: usize, height: usize) -> Result<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn set_rasterized_polygon(&mut self, ctx: &RasterizationContext, polygon: &Polygon) -> Result<()> {
        let Some(block_id) = polygon.block_id() else {
            warn!("多边形没有街区编号，不写入街区记录: {}", polygon);
            return Ok(());
        };
        debug!("街区 {}", String::from_utf8_lossy(block_id));

        if let Some(aggregator) = self.aggregator.as_mut() {
            return aggregator.add(block_id, ctx.pixels(), polygon.is_water());
        }

        let pixels = ctx.pixels().to_vec();
        let (land, water) = if polygon.is_water() {
            (Vec::new(), pixels)
        } else {
            self.land_pixels_in += pixels.len();
            (pixels, Vec::new())
        };
        self.records.push(BlockRecord {
            key: BlockKey::from_block_id(block_id),
            land,
            water,
        });
        Ok(())
    }
}
