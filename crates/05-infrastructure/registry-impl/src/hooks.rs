//! 目录钩子与内置拦截器

use parking_lot::RwLock;
use registry_abstractions::{
    CatalogEntry, CatalogEvent, Component, ContractExposer, EventHook, FindHook, HookError,
    Invocation, InvocationInterceptor, SubscriberId,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 查询钩子：对外隐藏需要拦截但尚未代理的原始条目
#[derive(Debug, Default)]
pub struct ProxyOnlyFindHook;

impl ProxyOnlyFindHook {
    /// 创建钩子
    pub fn new() -> Self {
        Self
    }
}

impl FindHook for ProxyOnlyFindHook {
    fn name(&self) -> &str {
        "proxy-only-find"
    }

    fn filter_entries(&self, entries: &mut Vec<CatalogEntry>) {
        entries.retain(|entry| !entry.is_raw_interceptable());
    }
}

/// 事件钩子：原始条目的事件只投递给同步器自身的订阅
#[derive(Debug, Default)]
pub struct ProxyOnlyEventHook {
    exempt: RwLock<Option<SubscriberId>>,
}

impl ProxyOnlyEventHook {
    /// 创建钩子，`exempt` 订阅者可以收到全部事件
    pub fn new(exempt: SubscriberId) -> Self {
        Self {
            exempt: RwLock::new(Some(exempt)),
        }
    }

    /// 更换豁免的订阅者，同步器重新订阅后调用
    pub fn set_exempt(&self, exempt: SubscriberId) {
        *self.exempt.write() = Some(exempt);
    }

    /// 当前豁免的订阅者
    pub fn exempt(&self) -> Option<SubscriberId> {
        *self.exempt.read()
    }
}

impl EventHook for ProxyOnlyEventHook {
    fn name(&self) -> &str {
        "proxy-only-event"
    }

    fn deliver(&self, event: &CatalogEvent, subscriber: SubscriberId) -> bool {
        self.exempt() == Some(subscriber) || !event.is_raw_interceptable()
    }
}

/// 记录每次调用的拦截器
///
/// 注册后对全部代理组件生效，日志级别为 debug
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    name: String,
}

impl LoggingInterceptor {
    /// 创建拦截器
    pub fn new() -> Self {
        Self::with_name("call-logging")
    }

    /// 创建指定名称的拦截器
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_invoke(&self, invocation: &Invocation<'_>) -> Result<(), HookError> {
        debug!(
            "调用 {} -> {}, 参数: {:?}",
            invocation.target().name(),
            invocation.method(),
            invocation.args()
        );
        Ok(())
    }

    fn after_invoke(
        &self,
        invocation: &Invocation<'_>,
        result: &dyn fmt::Debug,
    ) -> Result<(), HookError> {
        debug!("调用 {} 完成, 结果: {:?}", invocation.method(), result);
        Ok(())
    }
}

impl Component for LoggingInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
        exposer.provide::<dyn InvocationInterceptor>(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::ComponentProperties;
    use registry_abstractions::{BackingHandle, ComponentInstance, ContractType};

    struct Audited;

    impl Component for Audited {
        fn is_interceptable(&self) -> bool {
            true
        }

        fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
            exposer.provide::<dyn InvocationInterceptor>(Arc::new(LoggingInterceptor::new()));
            let _ = self;
        }
    }

    fn entry(handle: u64, proxy: bool) -> CatalogEntry {
        let mut properties = ComponentProperties::new();
        if proxy {
            properties.insert("component.proxy", true);
        }
        CatalogEntry::new(
            BackingHandle::new(handle),
            ComponentInstance::new(Arc::new(Audited)),
            vec![ContractType::of::<dyn InvocationInterceptor>()],
            properties,
        )
    }

    #[test]
    fn test_find_hook_hides_raw_entries() {
        let mut entries = vec![entry(1, false), entry(2, true)];
        ProxyOnlyFindHook::new().filter_entries(&mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handle(), BackingHandle::new(2));
    }

    #[test]
    fn test_event_hook_only_exempts_synchronizer() {
        let hook = ProxyOnlyEventHook::new(SubscriberId::new(1));
        let raw = CatalogEvent::registered(&entry(1, false));
        let proxied = CatalogEvent::registered(&entry(2, true));

        assert!(hook.deliver(&raw, SubscriberId::new(1)));
        assert!(!hook.deliver(&raw, SubscriberId::new(2)));
        assert!(hook.deliver(&proxied, SubscriberId::new(2)));

        hook.set_exempt(SubscriberId::new(2));
        assert!(hook.deliver(&raw, SubscriberId::new(2)));
        assert!(!hook.deliver(&raw, SubscriberId::new(1)));
    }
}
