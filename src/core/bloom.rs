//! 计数布隆过滤器
//!
//! 固定大小的位数组 + 可选计数数组，用于负向查询短路与自定义短码查重。
//! 位数组大小与哈希函数数量在构造时一次性确定，之后不可调整。
//! 支持序列化/反序列化，重启后可恢复状态。

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::RwLock;
use xxhash_rust::xxh3::xxh3_64_with_seed;
use xxhash_rust::xxh64::xxh64;

use crate::errors::{ResilinkError, Result};

const LN_2: f64 = std::f64::consts::LN_2;

struct BloomState {
    bits: Vec<u8>,
    /// 每个 bit 一个计数器，仅计数模式存在
    counters: Option<Vec<u16>>,
}

pub struct BloomFilter {
    state: RwLock<BloomState>,
    bit_set_size: usize,
    num_hashes: u32,
}

impl BloomFilter {
    /// 根据目标容量与误报率确定位数组大小和哈希函数数量
    pub fn new(capacity: usize, fp_rate: f64, counting: bool) -> Result<Self> {
        if capacity == 0 {
            return Err(ResilinkError::validation("bloom capacity must be > 0"));
        }
        if !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(ResilinkError::validation(
                "bloom false positive rate must be in (0, 1)",
            ));
        }

        let bits_per_element = (-fp_rate.log2() / LN_2).ceil();
        let bit_set_size = (capacity as f64 * bits_per_element).ceil() as usize;
        let num_hashes = ((bit_set_size as f64 / capacity as f64) * LN_2).round().max(1.0) as u32;

        let byte_len = bit_set_size.div_ceil(8);
        Ok(Self {
            state: RwLock::new(BloomState {
                bits: vec![0u8; byte_len],
                counters: counting.then(|| vec![0u16; bit_set_size]),
            }),
            bit_set_size,
            num_hashes,
        })
    }

    pub fn bit_set_size(&self) -> usize {
        self.bit_set_size
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn is_counting(&self) -> bool {
        self.state.read().counters.is_some()
    }

    /// 每个探针轮流使用 xxh64 / xxh3，以探针序号作为 seed
    fn probe_positions(&self, key: &str) -> Vec<usize> {
        let data = key.as_bytes();
        (0..self.num_hashes)
            .map(|i| {
                let seed = i as u64;
                let hash = if i % 2 == 0 {
                    xxh64(data, seed)
                } else {
                    xxh3_64_with_seed(data, seed)
                };
                (hash % self.bit_set_size as u64) as usize
            })
            .collect()
    }

    pub fn add(&self, key: &str) {
        let positions = self.probe_positions(key);
        let mut state = self.state.write();
        for &pos in &positions {
            state.bits[pos / 8] |= 1 << (pos % 8);
            if let Some(ref mut counters) = state.counters {
                counters[pos] = counters[pos].saturating_add(1);
            }
        }
    }

    /// false 表示一定不存在，true 表示可能存在
    pub fn test(&self, key: &str) -> bool {
        let positions = self.probe_positions(key);
        let state = self.state.read();
        positions
            .iter()
            .all(|&pos| state.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    /// 从计数过滤器中移除一个 key
    ///
    /// 任一探针计数为 0 说明 key 从未加入，不做任何修改并返回 false。
    /// 非计数模式下返回 UnsupportedOperation。
    pub fn remove(&self, key: &str) -> Result<bool> {
        let positions = self.probe_positions(key);
        let mut state = self.state.write();
        let Some(ref mut counters) = state.counters else {
            return Err(ResilinkError::unsupported_operation(
                "remove requires a counting bloom filter",
            ));
        };

        if positions.iter().any(|&pos| counters[pos] == 0) {
            return Ok(false);
        }

        let mut cleared = Vec::new();
        for &pos in &positions {
            counters[pos] -= 1;
            if counters[pos] == 0 {
                cleared.push(pos);
            }
        }
        for pos in cleared {
            state.bits[pos / 8] &= !(1 << (pos % 8));
        }
        Ok(true)
    }

    /// 已置位比例，用于观测过滤器饱和度
    pub fn fill_ratio(&self) -> f64 {
        let state = self.state.read();
        let set_bits: u32 = state.bits.iter().map(|b| b.count_ones()).sum();
        set_bits as f64 / self.bit_set_size as f64
    }

    /// 序列化为固定头部 + 原始位数组（+ 计数数组）
    ///
    /// 头部（小端）：bit_set_size u64、num_hashes u32、counting u8、位数组字节长度 u64
    pub fn serialize(&self) -> Vec<u8> {
        let state = self.state.read();
        let mut buf = BytesMut::with_capacity(
            21 + state.bits.len() + state.counters.as_ref().map_or(0, |c| c.len() * 2),
        );
        buf.put_u64_le(self.bit_set_size as u64);
        buf.put_u32_le(self.num_hashes);
        buf.put_u8(state.counters.is_some() as u8);
        buf.put_u64_le(state.bits.len() as u64);
        buf.put_slice(&state.bits);
        if let Some(ref counters) = state.counters {
            for &c in counters {
                buf.put_u16_le(c);
            }
        }
        buf.to_vec()
    }

    /// 从 serialize 的字节布局重建等价过滤器
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 21 {
            return Err(ResilinkError::serialization(
                "bloom filter payload too short for header",
            ));
        }
        let bit_set_size = buf.get_u64_le() as usize;
        let num_hashes = buf.get_u32_le();
        let counting = buf.get_u8() != 0;
        let bit_bytes = buf.get_u64_le() as usize;

        if bit_bytes != bit_set_size.div_ceil(8) {
            return Err(ResilinkError::serialization(
                "bloom filter header is inconsistent with bit array size",
            ));
        }
        if buf.remaining() < bit_bytes {
            return Err(ResilinkError::serialization(
                "bloom filter payload truncated in bit array",
            ));
        }
        let mut bits = vec![0u8; bit_bytes];
        buf.copy_to_slice(&mut bits);

        let counters = if counting {
            if buf.remaining() < bit_set_size * 2 {
                return Err(ResilinkError::serialization(
                    "bloom filter payload truncated in counter array",
                ));
            }
            let mut counters = Vec::with_capacity(bit_set_size);
            for _ in 0..bit_set_size {
                counters.push(buf.get_u16_le());
            }
            Some(counters)
        } else {
            None
        };

        Ok(Self {
            state: RwLock::new(BloomState { bits, counters }),
            bit_set_size,
            num_hashes,
        })
    }
}
