use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::panic;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use log::{info, warn};

use crate::{BucketGrid, Result};

/// 邻接关系的接收端
pub trait SetLink {
    /// 记录街区`a`与`b`相邻
    ///
    /// # 返回值
    /// 只有这一对是第一次被记录时才返回true；重复的、或者无法判断的都返回false
    fn set_link(&mut self, a: &[u8], b: &[u8]) -> bool;
}

impl<S: SetLink + ?Sized> SetLink for &mut S {
    fn set_link(&mut self, a: &[u8], b: &[u8]) -> bool {
        (**self).set_link(a, b)
    }
}

/// 把一对街区编号排成(较小, 较大)，按字节的字典序比较
///
/// 两个编号相同时返回None：同一个街区不和自己相邻。
pub fn canonical_pair<'a>(a: &'a [u8], b: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
    match a.cmp(b) {
        std::cmp::Ordering::Less => Some((a, b)),
        std::cmp::Ordering::Greater => Some((b, a)),
        std::cmp::Ordering::Equal => None,
    }
}

/// 有序的邻接集合：较小的编号映射到所有比它大的相邻编号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeLinks {
    links: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>,
    len: usize,
}

impl TreeLinks {
    pub fn new() -> Self {
        TreeLinks::default()
    }

    /// 记录下的邻接对个数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 是否记录过`a`与`b`相邻（顺序无关）
    pub fn contains(&self, a: &[u8], b: &[u8]) -> bool {
        canonical_pair(a, b).map_or(false, |(lower, upper)| {
            self.links
                .get(lower)
                .map_or(false, |uppers| uppers.contains(upper))
        })
    }

    /// 按(较小, 较大)排序依次给出所有邻接对
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.links.iter().flat_map(|(lower, uppers)| {
            uppers
                .iter()
                .map(move |upper| (lower.as_slice(), upper.as_slice()))
        })
    }
}

impl SetLink for TreeLinks {
    fn set_link(&mut self, a: &[u8], b: &[u8]) -> bool {
        let Some((lower, upper)) = canonical_pair(a, b) else {
            return false;
        };
        // 已经存在的键不再分配新的Vec
        let added = match self.links.get_mut(lower) {
            Some(uppers) => !uppers.contains(upper) && uppers.insert(upper.to_vec()),
            None => {
                self.links
                    .insert(lower.to_vec(), BTreeSet::from([upper.to_vec()]));
                true
            }
        };
        if added {
            self.len += 1;
        }
        added
    }
}

/// 基于哈希表的邻接集合，插入更快，输出前需要排序
#[derive(Debug, Clone, Default)]
pub struct HashLinks {
    links: AHashMap<Vec<u8>, AHashSet<Vec<u8>>>,
    len: usize,
}

impl HashLinks {
    pub fn new() -> Self {
        HashLinks::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, a: &[u8], b: &[u8]) -> bool {
        canonical_pair(a, b).map_or(false, |(lower, upper)| {
            self.links
                .get(lower)
                .map_or(false, |uppers| uppers.contains(upper))
        })
    }

    /// 所有邻接对，按(较小, 较大)排序，便于写出确定的文件
    pub fn sorted_pairs(&self) -> Vec<(&[u8], &[u8])> {
        let mut pairs: Vec<(&[u8], &[u8])> = self
            .links
            .iter()
            .flat_map(|(lower, uppers)| {
                uppers
                    .iter()
                    .map(move |upper| (lower.as_slice(), upper.as_slice()))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

impl SetLink for HashLinks {
    fn set_link(&mut self, a: &[u8], b: &[u8]) -> bool {
        let Some((lower, upper)) = canonical_pair(a, b) else {
            return false;
        };
        let added = match self.links.get_mut(lower) {
            Some(uppers) => !uppers.contains(upper) && uppers.insert(upper.to_vec()),
            None => {
                let mut uppers = AHashSet::new();
                uppers.insert(upper.to_vec());
                self.links.insert(lower.to_vec(), uppers);
                true
            }
        };
        if added {
            self.len += 1;
        }
        added
    }
}

/// 用互斥锁包装一个[SetLink]，让多个线程共用
///
/// 锁只在插入一对编号时持有。
/// 通过共享引用使用：`&SynchronizedLinks`本身实现了[SetLink]。
#[derive(Debug)]
pub struct SynchronizedLinks<'a, S> {
    inner: Mutex<&'a mut S>,
}

impl<'a, S: SetLink> SynchronizedLinks<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        SynchronizedLinks {
            inner: Mutex::new(inner),
        }
    }
}

impl<S: SetLink> SetLink for &SynchronizedLinks<'_, S> {
    fn set_link(&mut self, a: &[u8], b: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.set_link(a, b)
    }
}

/// 找出与网格中第`id`个多边形相邻的所有多边形，把邻接对写入`out`
///
/// 只检查与它的包围盒相交的格子中登记的多边形。
/// 没有街区编号的多边形不参与邻接检测。
///
/// # 返回值
/// 新记录的邻接对个数
pub fn link_polygon<S: SetLink + ?Sized>(grid: &BucketGrid, id: usize, out: &mut S) -> usize {
    let Some(polygon) = grid.polygon(id) else {
        return 0;
    };
    let Some(block_id) = polygon.block_id() else {
        warn!("多边形没有街区编号，不参与邻接检测: {}", polygon);
        return 0;
    };

    let mut count = 0;
    for other_id in grid.candidates(polygon.bbox()) {
        if other_id == id {
            continue;
        }
        let Some(other) = grid.polygon(other_id) else {
            continue;
        };
        let Some(other_block) = other.block_id() else {
            continue;
        };
        if polygon.shares_two_points(other) && out.set_link(block_id, other_block) {
            count += 1;
        }
    }
    count
}

/// 单线程地对网格中所有多边形做邻接检测
///
/// # 返回值
/// 新记录的邻接对个数
pub fn map_links<S: SetLink>(grid: &BucketGrid, out: &mut S) -> usize {
    let start = Instant::now();
    let count: usize = (0..grid.len())
        .map(|id| link_polygon(grid, id, &mut *out))
        .sum();
    info!(
        "计算出{}个邻接对，用时{:.3}秒",
        count,
        start.elapsed().as_secs_f64()
    );
    count
}

/// 用`threads`个工作线程对网格中所有多边形做邻接检测
///
/// 各线程从共享的游标里领取下一个多边形（只有领取时加锁），检测时网格只读，
/// 邻接对通过[SynchronizedLinks]写入同一个`out`。
/// 最终的集合与单线程结果完全相同，只是发现的顺序不同。
/// `threads`不大于1时退化为[map_links]。
///
/// # 返回值
/// 所有线程新记录的邻接对个数之和
pub fn map_links_threaded<S: SetLink + Send>(grid: &BucketGrid, out: &mut S, threads: usize) -> usize {
    if threads <= 1 {
        return map_links(grid, out);
    }

    let start = Instant::now();
    let cursor = Mutex::new(0..grid.len());
    let links = SynchronizedLinks::new(out);

    let count = thread::scope(|scope| {
        let mut workers = Vec::with_capacity(threads);
        for _ in 0..threads {
            workers.push(scope.spawn(|| {
                let mut sink = &links;
                let mut count = 0;
                loop {
                    let next = cursor
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .next();
                    let Some(id) = next else {
                        break;
                    };
                    count += link_polygon(grid, id, &mut sink);
                }
                count
            }));
        }
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or_else(|e| panic::resume_unwind(e)))
            .sum::<usize>()
    });

    info!(
        "{}个线程计算出{}个邻接对，用时{:.3}秒",
        threads,
        count,
        start.elapsed().as_secs_f64()
    );
    count
}

/// 写出邻接文件：每行`较小编号,较大编号`，编号按原始字节写出，不做转义
///
/// # 返回值
/// 写出的行数
pub fn write_links<'a, W, I>(out: &mut W, pairs: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut count = 0;
    for (lower, upper) in pairs {
        out.write_all(lower)?;
        out.write_all(b",")?;
        out.write_all(upper)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    info!("写出{}个邻接对", count);
    Ok(count)
}
