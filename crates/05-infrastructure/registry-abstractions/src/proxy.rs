//! 拦截代理与拦截链
//!
//! 代理只是转发层：[`ProxyHandle`] 持有唯一的目标组件以及所属注册信息的标识，
//! 每次调用依次执行全部前置拦截器、目标方法、全部后置拦截器。
//! 拦截器列表从注册表中动态发现，按注册表版本号惰性重建，调用期间只读。

use crate::component::{Component, ComponentInstance};
use crate::interceptor::{HookError, Invocation, InvocationInterceptor, MethodSignature};
use crate::registry::RegistrationId;
use infrastructure_common::ComponentError;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// 拦截器来源，通常由注册表实现
pub trait HookSource: Send + Sync {
    /// 当前版本号，注册表每次变更后递增
    fn generation(&self) -> u64;

    /// 按发现顺序返回当前全部拦截器
    fn interceptors(&self) -> Vec<Arc<dyn InvocationInterceptor>>;
}

struct EmptyHookSource;

impl HookSource for EmptyHookSource {
    fn generation(&self) -> u64 {
        0
    }

    fn interceptors(&self) -> Vec<Arc<dyn InvocationInterceptor>> {
        Vec::new()
    }
}

type HookList = Arc<[Arc<dyn InvocationInterceptor>]>;

struct CachedHooks {
    generation: u64,
    hooks: HookList,
}

/// 拦截链
pub struct InterceptionChain {
    source: Weak<dyn HookSource>,
    cache: RwLock<Option<CachedHooks>>,
}

impl InterceptionChain {
    /// 创建绑定到拦截器来源的拦截链
    pub fn new(source: Weak<dyn HookSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// 创建没有拦截器的拦截链
    pub fn detached() -> Self {
        let source: Weak<dyn HookSource> = Weak::<EmptyHookSource>::new();
        Self::new(source)
    }

    /// 当前拦截器列表，来源版本变化时重建
    pub fn hooks(&self) -> HookList {
        let Some(source) = self.source.upgrade() else {
            return Arc::from(Vec::new());
        };

        let generation = source.generation();
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.generation == generation {
                return Arc::clone(&cached.hooks);
            }
        }

        let hooks: HookList = source.interceptors().into();
        debug!("重建拦截链: {} 个拦截器, 版本 {}", hooks.len(), generation);
        *self.cache.write() = Some(CachedHooks {
            generation,
            hooks: Arc::clone(&hooks),
        });
        hooks
    }

    /// 包装组件实例，已是代理的实例原样返回
    pub fn wrap(
        self: &Arc<Self>,
        instance: &ComponentInstance,
        registration: RegistrationId,
    ) -> ComponentInstance {
        if instance.is_proxy() {
            return instance.clone();
        }
        let handle = Arc::new(ProxyHandle {
            target: Arc::clone(instance.component()),
            registration,
            chain: Arc::clone(self),
        });
        debug!("创建代理: {} ({})", instance.name(), registration);
        instance.with_proxy(handle)
    }
}

impl fmt::Debug for InterceptionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .cache
            .read()
            .as_ref()
            .map(|cached| (cached.generation, cached.hooks.len()));
        f.debug_struct("InterceptionChain")
            .field("cached", &cached)
            .finish()
    }
}

/// 代理句柄
pub struct ProxyHandle {
    target: Arc<dyn Component>,
    registration: RegistrationId,
    chain: Arc<InterceptionChain>,
}

impl ProxyHandle {
    /// 目标组件
    pub fn target(&self) -> &Arc<dyn Component> {
        &self.target
    }

    /// 所属注册信息
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// 拦截链
    pub fn chain(&self) -> &Arc<InterceptionChain> {
        &self.chain
    }

    /// 经过拦截链调用目标方法
    ///
    /// 前置拦截器否决时返回 [`ComponentError::Vetoed`]，目标方法与后置拦截器都不执行；
    /// 目标方法返回的错误原样传给调用方，且不执行后置拦截器
    pub fn invoke<T, R, E, F>(
        &self,
        target: &T,
        method: &MethodSignature,
        args: &[&dyn fmt::Debug],
        call: F,
    ) -> Result<R, E>
    where
        T: ?Sized,
        R: fmt::Debug,
        E: From<ComponentError>,
        F: FnOnce(&T) -> Result<R, E>,
    {
        let hooks = self.chain.hooks();
        let invocation = Invocation::new(&*self.target, method, args);

        for hook in hooks.iter() {
            run_hook(hook.as_ref(), method, "before", || {
                hook.before_invoke(&invocation)
            })?;
        }

        let result = call(target)?;

        for hook in hooks.iter() {
            run_hook(hook.as_ref(), method, "after", || {
                hook.after_invoke(&invocation, &result)
            })?;
        }

        Ok(result)
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("target", &self.target.name())
            .field("registration", &self.registration)
            .finish()
    }
}

fn run_hook<F>(
    hook: &dyn InvocationInterceptor,
    method: &MethodSignature,
    phase: &str,
    f: F,
) -> Result<(), ComponentError>
where
    F: FnOnce() -> Result<(), HookError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(HookError::Veto { reason })) => {
            debug!("拦截器 {} 否决调用 {}: {}", hook.name(), method, reason);
            Err(ComponentError::Vetoed {
                hook: hook.name().to_string(),
                method: method.to_string(),
                reason,
            })
        }
        Ok(Err(HookError::Failed { message })) => {
            report_failure(hook, method, phase, message);
            Ok(())
        }
        Err(payload) => {
            report_failure(hook, method, phase, panic_message(payload.as_ref()));
            Ok(())
        }
    }
}

fn report_failure(hook: &dyn InvocationInterceptor, method: &MethodSignature, phase: &str, message: String) {
    let error = ComponentError::HookFailure {
        hook: hook.name().to_string(),
        method: method.to_string(),
        message,
    };
    warn!("{} ({}), 已跳过", error, phase);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "未知 panic".to_string())
}

/// 契约代理
///
/// 为某个契约实现转发时，每个方法调用 [`ServiceProxy::invoke`]
pub struct ServiceProxy<C: ?Sized> {
    target: Arc<C>,
    handle: Arc<ProxyHandle>,
}

impl<C: ?Sized + 'static> ServiceProxy<C> {
    /// 创建契约代理
    pub fn new(target: Arc<C>, handle: Arc<ProxyHandle>) -> Self {
        Self { target, handle }
    }

    /// 目标契约对象
    pub fn target(&self) -> &Arc<C> {
        &self.target
    }

    /// 代理句柄
    pub fn handle(&self) -> &Arc<ProxyHandle> {
        &self.handle
    }

    /// 经过拦截链调用目标方法
    pub fn invoke<R, E, F>(&self, method: &'static str, args: &[&dyn fmt::Debug], call: F) -> Result<R, E>
    where
        R: fmt::Debug,
        E: From<ComponentError>,
        F: FnOnce(&C) -> Result<R, E>,
    {
        let signature = MethodSignature::of::<C>(method);
        self.handle.invoke(&*self.target, &signature, args, call)
    }
}

impl<C: ?Sized> fmt::Debug for ServiceProxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("handle", &self.handle)
            .finish()
    }
}
