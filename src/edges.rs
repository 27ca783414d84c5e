use ahash::AHashMap;
use log::{info, warn};

use crate::{PolyLine, SetLink};

/// 一条"边"记录：一段边界折线，以及它左右两侧的面编号
///
/// 面编号缺失（例如州界上的边只有一侧有面）时为None。
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub line: PolyLine,
    pub face_left: Option<u64>,
    pub face_right: Option<u64>,
}

/// 从面与边数据推出街区邻接关系
///
/// 先用[EdgeLinker::add_face]登记每个面所属的街区，再逐条喂入边记录：
/// 一条边两侧的面属于不同街区时，这两个街区相邻。
/// 结果与多边形共享顶点的方法写入同一种[SetLink]。
#[derive(Debug)]
pub struct EdgeLinker<S> {
    faces: AHashMap<u64, Vec<u8>>,
    out: S,
    edges: usize,
    errors: usize,
    links: usize,
}

impl<S: SetLink> EdgeLinker<S> {
    pub fn new(out: S) -> Self {
        EdgeLinker {
            faces: AHashMap::new(),
            out,
            edges: 0,
            errors: 0,
            links: 0,
        }
    }

    /// 登记面`face`属于街区`block_id`，重复登记时以后一次为准
    pub fn add_face(&mut self, face: u64, block_id: impl Into<Vec<u8>>) {
        self.faces.insert(face, block_id.into());
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// 处理一条边
    ///
    /// # 返回值
    /// 这条边带来了一个新的邻接对时返回true
    pub fn add_edge(&mut self, edge: &EdgeRecord) -> bool {
        self.edges += 1;
        let (Some(left), Some(right)) = (edge.face_left, edge.face_right) else {
            self.errors += 1;
            return false;
        };
        let (Some(a), Some(b)) = (self.faces.get(&left), self.faces.get(&right)) else {
            self.errors += 1;
            return false;
        };
        // 同一街区内部的边
        if a == b {
            return false;
        }
        let added = self.out.set_link(a, b);
        if added {
            self.links += 1;
        }
        added
    }

    /// 结束处理，取回邻接集合
    pub fn finish(self) -> S {
        if self.errors > 0 {
            warn!(
                "{}条边中有{}条缺少面编号或面编号无法对应到街区",
                self.edges, self.errors
            );
        }
        info!("从{}条边得到{}个邻接对", self.edges, self.links);
        self.out
    }
}
