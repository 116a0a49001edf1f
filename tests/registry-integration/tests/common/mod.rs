//! 集成测试共用的组件与工具

#![allow(dead_code)]

use infrastructure_common::{ComponentError, ComponentProperties};
use parking_lot::Mutex;
use registry_abstractions::{
    BackingHandle, Component, ComponentInstance, Contract, ContractExposer, ContractType,
    HookError, Invocation, InvocationInterceptor, ServiceProxy,
};
use registry_impl::InMemoryServiceCatalog;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 测试契约
pub trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> Result<String, ComponentError>;
}

impl Contract for dyn Greeter {
    fn intercept(proxy: ServiceProxy<Self>) -> Option<Arc<Self>> {
        Some(Arc::new(proxy))
    }
}

impl Greeter for ServiceProxy<dyn Greeter> {
    fn greet(&self, name: &str) -> Result<String, ComponentError> {
        self.invoke("greet", &[&name], |target| target.greet(name))
    }
}

/// 可拦截的模块组件
pub struct ModuleGreeter {
    pub prefix: &'static str,
    pub deactivations: AtomicUsize,
}

impl ModuleGreeter {
    pub fn new(prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            deactivations: AtomicUsize::new(0),
        })
    }
}

impl Greeter for ModuleGreeter {
    fn greet(&self, name: &str) -> Result<String, ComponentError> {
        Ok(format!("{} {name}", self.prefix))
    }
}

impl Component for ModuleGreeter {
    fn is_interceptable(&self) -> bool {
        true
    }

    fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
        exposer.provide::<dyn Greeter>(self);
    }

    fn on_deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }
}

/// 不需要拦截的普通组件
pub struct PlainGreeter;

impl Greeter for PlainGreeter {
    fn greet(&self, name: &str) -> Result<String, ComponentError> {
        Ok(format!("plain {name}"))
    }
}

impl Component for PlainGreeter {
    fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
        exposer.provide::<dyn Greeter>(self);
    }
}

/// 记录调用的拦截器
#[derive(Default)]
pub struct CallRecorder {
    pub calls: Mutex<Vec<String>>,
}

impl CallRecorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl InvocationInterceptor for CallRecorder {
    fn name(&self) -> &str {
        "call-recorder"
    }

    fn before_invoke(&self, invocation: &Invocation<'_>) -> Result<(), HookError> {
        self.calls.lock().push(invocation.method().to_string());
        Ok(())
    }
}

impl Component for CallRecorder {
    fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
        exposer.provide::<dyn InvocationInterceptor>(self);
    }
}

/// 以模块身份发布组件
pub fn publish<T: Component>(
    catalog: &InMemoryServiceCatalog,
    module: &str,
    component: Arc<T>,
    properties: ComponentProperties,
) -> BackingHandle {
    catalog
        .publish_from_module(
            module,
            ComponentInstance::new(component),
            &[ContractType::of::<dyn Greeter>()],
            properties,
        )
        .expect("发布目录条目")
}

/// 轮询直到条件成立
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
