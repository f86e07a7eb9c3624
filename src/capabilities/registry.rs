//! 能力注册表
//!
//! 所有能力（agent / skill）实现 Capability trait（descriptor / invoke），由 CapabilityRegistry 按名注册与查找。
//! 注册表在启动时构建一次，以 Arc 注入编排器；查找不到是正常结果（None），由调度器转为单步失败。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::orchestration::{ExecutionContext, StepResult, TargetType};

/// 能力描述符：供 Planner 了解能力、供调度器限定工具范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    pub kind: TargetType,
    pub description: String,
    #[serde(default)]
    pub tool_allow_list: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, kind: TargetType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            tool_allow_list: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_allow_list = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }
}

/// 能力 trait
///
/// 业务上的失败应返回 `Ok(StepResult { success: false, .. })`；
/// 返回 Err 或 panic 也会被调度器接住并转为失败结果。
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    async fn invoke(&self, task: &str, ctx: ExecutionContext) -> anyhow::Result<StepResult>;
}

/// 能力注册表：按名称存储 Arc<dyn Capability>；BTreeMap 保证目录输出顺序稳定
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册能力；同名能力后注册者覆盖前者
    pub fn register(&mut self, capability: impl Capability + 'static) {
        self.register_arc(Arc::new(capability));
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.descriptor().name.clone();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(capability = %name, "capability re-registered, previous entry replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// 按名称与类型解析；类型不符时视为未注册
    pub fn resolve(&self, kind: TargetType, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities
            .get(name)
            .filter(|c| c.descriptor().kind == kind)
            .cloned()
    }

    /// 已注册能力的类型
    pub fn kind_of(&self, name: &str) -> Option<TargetType> {
        self.capabilities.get(name).map(|c| c.descriptor().kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<&CapabilityDescriptor> {
        self.capabilities.values().map(|c| c.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// 生成 planner prompt 中的能力目录段落
    pub fn catalogue(&self) -> String {
        let mut out = String::new();
        for d in self.descriptors() {
            out.push_str(&format!("- {} ({}): {}\n", d.name, d.kind.as_str(), d.description));
            if !d.tool_allow_list.is_empty() {
                out.push_str(&format!("  tools: {}\n", d.tool_allow_list.join(", ")));
            }
            for ex in &d.examples {
                out.push_str(&format!("  e.g. {}\n", ex));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::EchoSkill;

    struct Dummy(CapabilityDescriptor);

    #[async_trait]
    impl Capability for Dummy {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.0
        }

        async fn invoke(&self, task: &str, _ctx: ExecutionContext) -> anyhow::Result<StepResult> {
            Ok(StepResult::ok(task.to_string()))
        }
    }

    fn calendar() -> Dummy {
        Dummy(
            CapabilityDescriptor::new("calendar-agent", TargetType::Agent, "Reads and edits calendars")
                .with_tools(["calendar.list", "calendar.create"])
                .with_examples(["List events for today"]),
        )
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let mut reg = CapabilityRegistry::new();
        reg.register(calendar());
        assert!(reg.get("calendar-agent").is_some());
        assert!(reg.get("ghost-agent").is_none());
        assert!(!reg.contains("ghost-agent"));
    }

    #[test]
    fn test_resolve_checks_kind() {
        let mut reg = CapabilityRegistry::new();
        reg.register(calendar());
        assert!(reg.resolve(TargetType::Agent, "calendar-agent").is_some());
        assert!(reg.resolve(TargetType::Skill, "calendar-agent").is_none());
    }

    #[test]
    fn test_catalogue_is_sorted_and_complete() {
        let mut reg = CapabilityRegistry::new();
        reg.register(EchoSkill::new());
        reg.register(calendar());
        assert_eq!(reg.names(), vec!["calendar-agent".to_string(), "echo".to_string()]);
        let cat = reg.catalogue();
        assert!(cat.starts_with("- calendar-agent (agent)"));
        assert!(cat.contains("tools: calendar.list, calendar.create"));
        assert!(cat.contains("e.g. List events for today"));
        assert!(cat.contains("- echo (skill)"));
    }

    #[test]
    fn test_reregister_replaces() {
        let mut reg = CapabilityRegistry::new();
        reg.register(calendar());
        reg.register(Dummy(CapabilityDescriptor::new(
            "calendar-agent",
            TargetType::Agent,
            "v2",
        )));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("calendar-agent").unwrap().descriptor().description, "v2");
    }

    #[test]
    fn test_kind_of() {
        let mut reg = CapabilityRegistry::new();
        reg.register(EchoSkill::new());
        assert_eq!(reg.kind_of("echo"), Some(TargetType::Skill));
        assert_eq!(reg.kind_of("ghost-agent"), None);
        assert!(reg.resolve(TargetType::Skill, "echo").is_some());
    }
}
