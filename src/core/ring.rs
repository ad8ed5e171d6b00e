//! 一致性哈希环
//!
//! 每个物理节点贡献若干虚拟节点，按哈希值升序排成环。
//! 节点增删触发整环重建，重建完成后通过 ArcSwap 原子发布，
//! 读取方永远不会看到半成品的环。

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use xxhash_rust::xxh64::xxh64;

use crate::errors::{ResilinkError, Result};

#[derive(Default)]
struct RingSnapshot {
    /// (虚拟节点哈希, 节点下标)，按哈希升序
    points: Vec<(u64, usize)>,
    /// 精确命中表，key 哈希恰好等于虚拟节点哈希时走快路径
    exact: HashMap<u64, usize>,
    nodes: Vec<String>,
}

pub struct HashRing {
    snapshot: ArcSwap<RingSnapshot>,
    /// 节点变更串行化，防止并发重建相互覆盖
    rebuild_lock: Mutex<()>,
    virtual_nodes_per_node: usize,
}

impl HashRing {
    pub fn new(virtual_nodes_per_node: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RingSnapshot::default()),
            rebuild_lock: Mutex::new(()),
            virtual_nodes_per_node: virtual_nodes_per_node.max(1),
        }
    }

    pub fn with_nodes<S: AsRef<str>>(virtual_nodes_per_node: usize, nodes: &[S]) -> Self {
        let ring = Self::new(virtual_nodes_per_node);
        {
            let _guard = ring.rebuild_lock.lock();
            let nodes: Vec<String> = nodes.iter().map(|n| n.as_ref().to_string()).collect();
            ring.publish(nodes);
        }
        ring
    }

    pub fn add_node(&self, node: &str) {
        let _guard = self.rebuild_lock.lock();
        let mut nodes = self.snapshot.load().nodes.clone();
        if nodes.iter().any(|n| n == node) {
            return;
        }
        nodes.push(node.to_string());
        self.publish(nodes);
    }

    pub fn remove_node(&self, node: &str) {
        let _guard = self.rebuild_lock.lock();
        let mut nodes = self.snapshot.load().nodes.clone();
        nodes.retain(|n| n != node);
        self.publish(nodes);
    }

    pub fn nodes(&self) -> Vec<String> {
        self.snapshot.load().nodes.clone()
    }

    /// 整环重建后原子替换快照
    fn publish(&self, mut nodes: Vec<String>) {
        // 节点列表先排序，保证注册顺序不影响下标与哈希结果
        nodes.sort();

        let mut points = Vec::with_capacity(nodes.len() * self.virtual_nodes_per_node);
        let mut exact = HashMap::with_capacity(nodes.len() * self.virtual_nodes_per_node);
        for (idx, node) in nodes.iter().enumerate() {
            for i in 0..self.virtual_nodes_per_node {
                let hash = xxh64(format!("{}-{}", node, i).as_bytes(), 0);
                points.push((hash, idx));
                exact.insert(hash, idx);
            }
        }
        points.sort_unstable();

        self.snapshot.store(Arc::new(RingSnapshot {
            points,
            exact,
            nodes,
        }));
    }

    /// 确定 key 归属的物理节点
    pub fn node_for(&self, key: &str) -> Result<String> {
        let snapshot = self.snapshot.load();
        if snapshot.points.is_empty() {
            return Err(ResilinkError::no_nodes_available(
                "consistent hash ring has no registered nodes",
            ));
        }

        let hash = xxh64(key.as_bytes(), 0);
        if let Some(&idx) = snapshot.exact.get(&hash) {
            return Ok(snapshot.nodes[idx].clone());
        }

        // 第一个哈希 >= key 哈希的虚拟节点；越过末尾则回绕到环首
        let pos = snapshot.points.partition_point(|&(h, _)| h < hash);
        let (_, idx) = snapshot.points[pos % snapshot.points.len()];
        Ok(snapshot.nodes[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring_fails() {
        let ring = HashRing::new(10);
        assert!(matches!(
            ring.node_for("key"),
            Err(ResilinkError::NoNodesAvailable(_))
        ));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring = HashRing::with_nodes(10, &["node-a", "node-b", "node-c"]);
        let first = ring.node_for("some-key").unwrap();
        for _ in 0..100 {
            assert_eq!(ring.node_for("some-key").unwrap(), first);
        }
    }

    #[test]
    fn test_registration_order_is_irrelevant() {
        let ring1 = HashRing::with_nodes(10, &["node-a", "node-b", "node-c"]);
        let ring2 = HashRing::with_nodes(10, &["node-c", "node-a", "node-b"]);

        for i in 0..500 {
            let key = format!("key_{}", i);
            assert_eq!(ring1.node_for(&key).unwrap(), ring2.node_for(&key).unwrap());
        }
    }

    #[test]
    fn test_removal_only_remaps_owned_keys() {
        let ring = HashRing::with_nodes(10, &["node-a", "node-b", "node-c"]);

        let before: Vec<(String, String)> = (0..1000)
            .map(|i| {
                let key = format!("key_{}", i);
                let node = ring.node_for(&key).unwrap();
                (key, node)
            })
            .collect();

        ring.remove_node("node-b");

        for (key, old_node) in before {
            let new_node = ring.node_for(&key).unwrap();
            if old_node == "node-b" {
                assert_ne!(new_node, "node-b");
            } else {
                // 未受影响的 key 归属不变
                assert_eq!(new_node, old_node);
            }
        }
    }

    #[test]
    fn test_add_node_spreads_load() {
        let ring = HashRing::with_nodes(50, &["node-a"]);
        ring.add_node("node-b");

        let mut hits_b = 0;
        for i in 0..1000 {
            if ring.node_for(&format!("key_{}", i)).unwrap() == "node-b" {
                hits_b += 1;
            }
        }
        // 两个节点各 50 个虚拟点，新节点应接走可观的一部分流量
        assert!(hits_b > 200, "node-b only received {} of 1000 keys", hits_b);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let ring = HashRing::with_nodes(10, &["node-a"]);
        ring.add_node("node-a");
        assert_eq!(ring.nodes().len(), 1);
    }
}
