//! 弹性核心原语：熔断器、布隆过滤器、一致性哈希环

pub mod bloom;
pub mod breaker;
pub mod ring;

pub use bloom::BloomFilter;
pub use breaker::{CircuitBreaker, CircuitState};
pub use ring::HashRing;
