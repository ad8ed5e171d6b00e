//! 两级缓存：进程内 LRU（L1）+ 共享缓存插件（L2）

pub mod l2;
pub mod macros;
pub mod register;
pub mod tiered;
pub mod traits;

pub use tiered::TieredCache;
pub use traits::SharedCache;
