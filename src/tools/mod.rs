//! 能力（工具）：名称到命令构造函数的映射

pub mod catalog;
pub mod registry;

pub use catalog::default_registry;
pub use registry::{Capability, CapabilityRegistry, RegistryError, FINISH_MISSION};
