use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::aggregate::{BlockKey, BlockRecord};
use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"BRST";
const VERSION: u8 = 1;

const TAG_NUMERIC: u8 = 0;
const TAG_RAW: u8 = 1;

/// 读取时预分配的上限，防止损坏的长度字段导致巨大的分配
const MAX_PREALLOC: usize = 1 << 16;

/// 整张栅格所有街区的像素记录，可以写成紧凑的二进制文件
///
/// 文件格式（整数都是小端序）：
///
/// | 字段 | 类型 |
/// |---|---|
/// | 魔数`BRST` | 4字节 |
/// | 版本 | u8 |
/// | 是否gzip压缩 | u8 |
///
/// 之后是（可能被gzip压缩的）正文：栅格宽、高、记录个数（u32），然后每条记录依次是
/// 键的类型（u8，0为数值键，1为原始字节键）、键（u64，或u32长度加字节）、
/// 陆地像素个数（u32）加上`x, y`对（u32），水域像素同理。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockRaster {
    pub width: usize,
    pub height: usize,
    pub records: Vec<BlockRecord>,
}

impl BlockRaster {
    /// 写出到`out`，`compress`为true时正文用gzip压缩
    pub fn write_to<W: Write>(&self, mut out: W, compress: bool) -> Result<()> {
        out.write_all(MAGIC)?;
        out.write_all(&[VERSION, u8::from(compress)])?;
        if compress {
            let mut encoder = GzEncoder::new(out, Compression::default());
            self.write_body(&mut encoder)?;
            encoder.finish()?.flush()?;
        } else {
            self.write_body(&mut out)?;
            out.flush()?;
        }
        Ok(())
    }

    fn write_body<W: Write>(&self, out: &mut W) -> Result<()> {
        write_len(out, self.width)?;
        write_len(out, self.height)?;
        write_len(out, self.records.len())?;
        for record in &self.records {
            match &record.key {
                BlockKey::Numeric(ubid) => {
                    out.write_all(&[TAG_NUMERIC])?;
                    out.write_all(&ubid.to_le_bytes())?;
                }
                BlockKey::Raw(bytes) => {
                    out.write_all(&[TAG_RAW])?;
                    write_len(out, bytes.len())?;
                    out.write_all(bytes)?;
                }
            }
            write_pixels(out, &record.land)?;
            write_pixels(out, &record.water)?;
        }
        Ok(())
    }

    /// 从`input`读回[BlockRaster::write_to]写出的文件
    ///
    /// # 错误
    /// 魔数、版本或键的类型不对时返回[Error::BadRecordFile]，文件被截断时返回[Error::Io]
    pub fn read_from<R: Read>(mut input: R) -> Result<Self> {
        let mut header = [0u8; 6];
        input.read_exact(&mut header)?;
        if &header[..4] != MAGIC {
            return Err(Error::BadRecordFile("魔数不对".to_string()));
        }
        if header[4] != VERSION {
            return Err(Error::BadRecordFile(format!("不支持的版本 {}", header[4])));
        }
        match header[5] {
            0 => read_body(&mut input),
            1 => read_body(&mut GzDecoder::new(input)),
            flag => Err(Error::BadRecordFile(format!("未知的压缩标记 {}", flag))),
        }
    }
}

fn write_len<W: Write>(out: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::BadRecordFile(format!("长度 {} 超出u32范围", len)))?;
    out.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn write_pixels<W: Write>(out: &mut W, pixels: &[(u32, u32)]) -> Result<()> {
    write_len(out, pixels.len())?;
    for &(x, y) in pixels {
        out.write_all(&x.to_le_bytes())?;
        out.write_all(&y.to_le_bytes())?;
    }
    Ok(())
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(input: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_pixels<R: Read>(input: &mut R) -> Result<Vec<(u32, u32)>> {
    let count = read_u32(input)? as usize;
    let mut pixels = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        let x = read_u32(input)?;
        let y = read_u32(input)?;
        pixels.push((x, y));
    }
    Ok(pixels)
}

fn read_body<R: Read>(input: &mut R) -> Result<BlockRaster> {
    let width = read_u32(input)? as usize;
    let height = read_u32(input)? as usize;
    let count = read_u32(input)? as usize;
    let mut records = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        let key = match read_u8(input)? {
            TAG_NUMERIC => BlockKey::Numeric(read_u64(input)?),
            TAG_RAW => {
                let len = read_u32(input)? as usize;
                let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOC));
                Read::take(&mut *input, len as u64).read_to_end(&mut bytes)?;
                if bytes.len() != len {
                    return Err(Error::BadRecordFile("街区编号被截断".to_string()));
                }
                BlockKey::Raw(bytes)
            }
            tag => return Err(Error::BadRecordFile(format!("未知的键类型 {}", tag))),
        };
        let land = read_pixels(input)?;
        let water = read_pixels(input)?;
        records.push(BlockRecord { key, land, water });
    }
    Ok(BlockRaster {
        width,
        height,
        records,
    })
}
