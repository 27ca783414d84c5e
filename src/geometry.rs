use std::fmt;

use euclid::Point2D;
use geo::{Coord, LineString, Rect};
use itertools::Itertools;
use num_traits::NumCast;

use crate::{Error, Result, Transform};

/// 计算一组坐标的包围盒，没有坐标时返回None
fn bounding_rect<'a, I>(coords: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a Coord<f64>>,
{
    coords.into_iter().fold(None, |acc, c| match acc {
        None => Some(Rect::new(*c, *c)),
        Some(rect) => Some(Rect::new(
            Coord {
                x: rect.min().x.min(c.x),
                y: rect.min().y.min(c.y),
            },
            Coord {
                x: rect.max().x.max(c.x),
                y: rect.max().y.max(c.y),
            },
        )),
    })
}

/// 两个包围盒是否相交（边界接触也算）
pub(crate) fn rects_touch(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

fn all_finite<'a>(mut coords: impl Iterator<Item = &'a Coord<f64>>) -> bool {
    coords.all(|c| c.x.is_finite() && c.y.is_finite())
}

/// 把任意数值类型的坐标对转换为f64坐标
fn to_float<T: NumCast + Copy>((x, y): (T, T)) -> Result<Coord<f64>> {
    match (NumCast::from(x), NumCast::from(y)) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(Error::NonFiniteCoordinate),
    }
}

/// 一个人口普查多边形（一个完整的街区，或者街区被切开后的一个"面"）。
///
/// 由若干个闭合的环组成（外环、孔洞或互不相连的部分都只是环，填充时统一按奇偶规则处理），
/// 附带包围盒、可选的街区编号和水域标记。
///
/// 构建之后几何形状只会被[Polygon::transform]或[Polygon::map_coords_in_place]整体改写，
/// 包围盒会随之重新计算，因此"所有点都在包围盒内"始终成立。
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    rings: Vec<LineString<f64>>,
    bbox: Rect<f64>,
    block_id: Option<Vec<u8>>,
    is_water: bool,
}

impl Polygon {
    /// 用一组环构建多边形
    ///
    /// # 错误
    /// * [Error::EmptyPolygon] - 没有任何环
    /// * [Error::DegenerateRing] - 某个环少于4个点
    /// * [Error::UnclosedRing] - 某个环的首点与末点不同
    /// * [Error::NonFiniteCoordinate] - 存在NaN或无限坐标
    pub fn new(rings: Vec<LineString<f64>>) -> Result<Self> {
        if rings.is_empty() {
            return Err(Error::EmptyPolygon);
        }
        for (index, ring) in rings.iter().enumerate() {
            if ring.0.len() < 4 {
                return Err(Error::DegenerateRing { ring: index });
            }
            if !all_finite(ring.0.iter()) {
                return Err(Error::NonFiniteCoordinate);
            }
            if !ring.is_closed() {
                return Err(Error::UnclosedRing { ring: index });
            }
        }
        let bbox = bounding_rect(rings.iter().flat_map(|ring| ring.0.iter()))
            .ok_or(Error::EmptyPolygon)?;
        Ok(Polygon {
            rings,
            bbox,
            block_id: None,
            is_water: false,
        })
    }

    /// 不做任何检查直接构建，只用于测试几何有缺陷时的行为
    #[cfg(test)]
    pub(crate) fn from_rings_unchecked(rings: Vec<LineString<f64>>) -> Self {
        let bbox = bounding_rect(rings.iter().flat_map(|ring| ring.0.iter()))
            .unwrap_or_else(|| Rect::new((0., 0.), (0., 0.)));
        Polygon {
            rings,
            bbox,
            block_id: None,
            is_water: false,
        }
    }

    /// 从坐标对列表构建多边形，坐标可以是任何能转换为f64的数值类型
    pub fn from_coords<T: NumCast + Copy>(rings: &[Vec<(T, T)>]) -> Result<Self> {
        let rings = rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .map(|&pair| to_float(pair))
                    .collect::<Result<Vec<_>>>()
                    .map(LineString::new)
            })
            .collect::<Result<Vec<_>>>()?;
        Polygon::new(rings)
    }

    /// 从[geo::Polygon]构建，外环和内环都成为普通的环
    pub fn from_geo(polygon: &geo::Polygon<f64>) -> Result<Self> {
        let rings = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .cloned()
            .collect();
        Polygon::new(rings)
    }

    /// 设置街区编号（外部属性表连接的结果）
    pub fn with_block_id(mut self, block_id: impl Into<Vec<u8>>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    /// 设置水域标记
    pub fn with_water(mut self, is_water: bool) -> Self {
        self.is_water = is_water;
        self
    }

    pub fn set_block_id(&mut self, block_id: Option<Vec<u8>>) {
        self.block_id = block_id;
    }

    pub fn rings(&self) -> &[LineString<f64>] {
        &self.rings
    }

    pub fn bbox(&self) -> &Rect<f64> {
        &self.bbox
    }

    pub fn block_id(&self) -> Option<&[u8]> {
        self.block_id.as_deref()
    }

    pub fn is_water(&self) -> bool {
        self.is_water
    }

    /// 所有环的点数之和（包括闭合点）
    pub fn point_count(&self) -> usize {
        self.rings.iter().map(|ring| ring.0.len()).sum()
    }

    /// 所有环的所有边，按环内顺序给出
    pub fn edges(&self) -> impl Iterator<Item = (Coord<f64>, Coord<f64>)> + '_ {
        self.rings
            .iter()
            .flat_map(|ring| {
                ring.0
                    .iter()
                    .copied()
                    .tuple_windows::<(Coord<f64>, Coord<f64>)>()
            })
    }

    /// 所有顶点，每个环的闭合点不重复计入
    /// 所有环上的所有点，包括每个环末尾重复的闭合点
    fn points(&self) -> impl Iterator<Item = &Coord<f64>> + '_ {
        self.rings.iter().flat_map(|ring| ring.0.iter())
    }

    /// 两个多边形是否至少有两对坐标完全相同的点
    ///
    /// 这是邻接判断的启发式规则：逐对比较两边的所有点，闭合点也参与比较，
    /// 匹配满两对即认为相邻。两个点不必相邻，也不必来自同一段边界。
    /// 因此只在一个角点相接的两个街区通常不相邻，但如果这个角点恰好是
    /// 其中一个环的起点（在环里出现两次），就会被判为相邻。
    pub fn shares_two_points(&self, other: &Polygon) -> bool {
        if !rects_touch(&self.bbox, &other.bbox) {
            return false;
        }
        let mut matches = 0;
        for a in self.points() {
            for b in other.points() {
                if a == b {
                    matches += 1;
                    if matches == 2 {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// 就地改写所有坐标，然后重新计算包围盒
    ///
    /// 用于在栅格化之前接入外部的投影步骤。
    ///
    /// # 错误
    /// 改写后出现NaN或无限坐标时返回[Error::NonFiniteCoordinate]，此时多边形保持原样
    pub fn map_coords_in_place<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(Coord<f64>) -> Coord<f64>,
    {
        let rings: Vec<LineString<f64>> = self
            .rings
            .iter()
            .map(|ring| ring.0.iter().map(|&c| f(c)).collect())
            .collect();
        if !all_finite(rings.iter().flat_map(|ring| ring.0.iter())) {
            return Err(Error::NonFiniteCoordinate);
        }
        self.bbox = bounding_rect(rings.iter().flat_map(|ring| ring.0.iter()))
            .ok_or(Error::EmptyPolygon)?;
        self.rings = rings;
        Ok(())
    }

    /// 用仿射变换就地改写所有坐标
    pub fn transform(&mut self, transform: &Transform) -> Result<()> {
        if transform.to_array().iter().any(|param| !param.is_finite()) {
            return Err(Error::NonFiniteCoordinate);
        }
        self.map_coords_in_place(|c| {
            transform
                .transform_point(Point2D::new(c.x, c.y))
                .to_tuple()
                .into()
        })
    }
}

/// 写出`(x,y x,y ...)`形式的一组环
fn fmt_parts(f: &mut fmt::Formatter<'_>, parts: &[LineString<f64>]) -> fmt::Result {
    for part in parts {
        write!(f, " (")?;
        for (i, c) in part.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{},{}", c.x, c.y)?;
        }
        write!(f, ")")?;
    }
    Ok(())
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Polygon {}<=x<={} {}<=y<={}",
            self.bbox.min().x,
            self.bbox.max().x,
            self.bbox.min().y,
            self.bbox.max().y
        )?;
        fmt_parts(f, &self.rings)?;
        write!(f, ")")
    }
}

/// 不闭合的折线集合，只用于"边"数据（参见[crate::EdgeLinker]）
#[derive(Debug, Clone, PartialEq)]
pub struct PolyLine {
    parts: Vec<LineString<f64>>,
    bbox: Rect<f64>,
}

impl PolyLine {
    /// 用一组折线构建，至少要有一个点
    pub fn new(parts: Vec<LineString<f64>>) -> Result<Self> {
        if !all_finite(parts.iter().flat_map(|part| part.0.iter())) {
            return Err(Error::NonFiniteCoordinate);
        }
        let bbox = bounding_rect(parts.iter().flat_map(|part| part.0.iter()))
            .ok_or(Error::EmptyPolygon)?;
        Ok(PolyLine { parts, bbox })
    }

    pub fn parts(&self) -> &[LineString<f64>] {
        &self.parts
    }

    pub fn bbox(&self) -> &Rect<f64> {
        &self.bbox
    }

    pub fn point_count(&self) -> usize {
        self.parts.iter().map(|part| part.0.len()).sum()
    }
}

impl fmt::Display for PolyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(PolyLine {}<=x<={} {}<=y<={}",
            self.bbox.min().x,
            self.bbox.max().x,
            self.bbox.min().y,
            self.bbox.max().y
        )?;
        fmt_parts(f, &self.parts)?;
        write!(f, ")")
    }
}
