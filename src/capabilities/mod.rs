//! 能力层：Capability trait、注册表与内置能力（通用智能体、Echo 技能）
//!
//! 具体领域能力（日历、邮件、文件、页面生成）由外部实现 Capability 后注册进来。

pub mod echo;
pub mod general;
pub mod registry;

pub use echo::EchoSkill;
pub use general::{GeneralAgent, GENERAL_AGENT};
pub use registry::{Capability, CapabilityDescriptor, CapabilityRegistry};
