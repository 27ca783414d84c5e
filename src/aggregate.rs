use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// 把街区编号解析为数值编号（UBID）
///
/// 去掉首尾的ASCII空白后必须是1到19位十进制数字，否则返回None。
/// 19位以内的十进制数一定能放进u64。
pub fn parse_ubid(block_id: &[u8]) -> Option<u64> {
    let start = block_id.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = block_id.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    let digits = &block_id[start..end];
    if digits.len() > 19 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        digits
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0')),
    )
}

/// 街区键：能解析为数值时用数值（比较快），否则用原始字节
///
/// 派生的[Ord]是全序（所有数值键排在原始字节键之前），只用于在有序表中存放；
/// 判断两个键是否指同一个街区要用[BlockKey::checked_cmp]。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKey {
    Numeric(u64),
    Raw(Vec<u8>),
}

impl BlockKey {
    pub fn from_block_id(block_id: &[u8]) -> Self {
        match parse_ubid(block_id) {
            Some(ubid) => BlockKey::Numeric(ubid),
            None => BlockKey::Raw(block_id.to_vec()),
        }
    }

    /// 比较两个同类的键：数值按大小，原始字节按字典序
    ///
    /// # 错误
    /// 数值键与原始字节键比较时返回[Error::KeyKindMismatch]
    pub fn checked_cmp(&self, other: &BlockKey) -> Result<Ordering> {
        match (self, other) {
            (BlockKey::Numeric(a), BlockKey::Numeric(b)) => Ok(a.cmp(b)),
            (BlockKey::Raw(a), BlockKey::Raw(b)) => Ok(a.cmp(b)),
            _ => Err(Error::KeyKindMismatch),
        }
    }

    pub fn ubid(&self) -> Option<u64> {
        match self {
            BlockKey::Numeric(ubid) => Some(*ubid),
            BlockKey::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            BlockKey::Numeric(_) => None,
            BlockKey::Raw(bytes) => Some(bytes),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKey::Numeric(ubid) => write!(f, "{}", ubid),
            BlockKey::Raw(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// 一个街区最终的栅格化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub key: BlockKey,
    /// 非水域片段覆盖的像素
    pub land: Vec<(u32, u32)>,
    /// 水域片段覆盖的像素
    pub water: Vec<(u32, u32)>,
}

/// 一个街区的暂存记录，累积它所有片段（面）的像素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHolder {
    key: BlockKey,
    land: Vec<(u32, u32)>,
    water: Vec<(u32, u32)>,
}

impl BlockHolder {
    pub fn new(key: BlockKey) -> Self {
        BlockHolder {
            key,
            land: Vec::new(),
            water: Vec::new(),
        }
    }

    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    pub fn land(&self) -> &[(u32, u32)] {
        &self.land
    }

    pub fn water(&self) -> &[(u32, u32)] {
        &self.water
    }

    /// 并入同一街区的一个片段
    ///
    /// # 错误
    /// * [Error::KeyKindMismatch] - 键的类型不同
    /// * [Error::BlockKeyMismatch] - 键不同，片段属于另一个街区
    pub fn add(&mut self, key: &BlockKey, pixels: &[(u32, u32)], is_water: bool) -> Result<()> {
        if self.key.checked_cmp(key)? != Ordering::Equal {
            return Err(Error::BlockKeyMismatch {
                held: self.key.to_string(),
                given: key.to_string(),
            });
        }
        if is_water {
            self.water.extend_from_slice(pixels);
        } else {
            self.land.extend_from_slice(pixels);
        }
        Ok(())
    }

    pub fn into_record(self) -> BlockRecord {
        BlockRecord {
            key: self.key,
            land: self.land,
            water: self.water,
        }
    }
}

/// 按街区键合并片段的像素
///
/// 一个街区在原始几何中可能被切成多个面，输出前需要把它们合成一条记录。
#[derive(Debug, Clone, Default)]
pub struct BlockAggregator {
    holders: BTreeMap<BlockKey, BlockHolder>,
    land_pixels_in: usize,
}

impl BlockAggregator {
    pub fn new() -> Self {
        BlockAggregator::default()
    }

    /// 把一个片段的像素并入它所属街区的暂存记录
    pub fn add(&mut self, block_id: &[u8], pixels: &[(u32, u32)], is_water: bool) -> Result<()> {
        let key = BlockKey::from_block_id(block_id);
        if !is_water {
            self.land_pixels_in += pixels.len();
        }
        match self.holders.get_mut(&key) {
            Some(holder) => holder.add(&key, pixels, is_water),
            None => {
                let mut holder = BlockHolder::new(key.clone());
                holder.add(&key, pixels, is_water)?;
                self.holders.insert(key, holder);
                Ok(())
            }
        }
    }

    /// 暂存的街区个数
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// 累计收到的陆地像素个数
    pub fn land_pixels_in(&self) -> usize {
        self.land_pixels_in
    }

    /// 按键的顺序逐个取出街区记录
    ///
    /// 每取出一条记录，对应的暂存数据就从聚合器中移除并释放。
    pub fn drain(&mut self) -> impl Iterator<Item = BlockRecord> + '_ {
        std::iter::from_fn(move || {
            self.holders
                .pop_first()
                .map(|(_, holder)| holder.into_record())
        })
    }

    pub fn into_records(mut self) -> Vec<BlockRecord> {
        self.drain().collect()
    }
}
