//! 契约类型
//!
//! 契约是组件对外暴露的能力，在 Rust 中表示为 trait object 类型（`dyn Trait`）。
//! 组件通过 [`ContractExposer`] 声明自己满足的全部契约，注册表据此支持按次要契约查找。

use crate::proxy::{ProxyHandle, ServiceProxy};
use infrastructure_common::TypeInfo;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 契约类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractType(TypeInfo);

impl ContractType {
    /// 获取契约类型，通常为 `ContractType::of::<dyn Trait>()`
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self(TypeInfo::of::<C>())
    }

    /// 完整类型名
    pub fn name(&self) -> &'static str {
        self.0.module_path
    }

    /// 简短类型名
    pub fn short_name(&self) -> &'static str {
        self.0.short_name()
    }

    /// 类型信息
    pub fn type_info(&self) -> TypeInfo {
        self.0
    }

    /// 判断是否为指定契约
    pub fn is<C: ?Sized + 'static>(&self) -> bool {
        self.0.is::<C>()
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// 可查找的契约
///
/// 为 `dyn Trait` 实现该 trait 后即可按该契约注册与查找组件。
/// 需要被拦截的契约覆盖 [`Contract::intercept`]，返回一个把每个方法
/// 转发给 [`ServiceProxy::invoke`] 的实现；默认返回 `None`，表示该契约上的调用不经过拦截链。
///
/// ```ignore
/// impl Contract for dyn Greeter {
///     fn intercept(proxy: ServiceProxy<Self>) -> Option<Arc<Self>> {
///         Some(Arc::new(proxy))
///     }
/// }
///
/// impl Greeter for ServiceProxy<dyn Greeter> {
///     fn greet(&self, name: &str) -> Result<String, ComponentError> {
///         self.invoke("greet", &[&name], |target| target.greet(name))
///     }
/// }
/// ```
pub trait Contract: Send + Sync + 'static {
    /// 把代理包装为契约对象
    fn intercept(proxy: ServiceProxy<Self>) -> Option<Arc<Self>> {
        let _ = proxy;
        None
    }
}

type WrapFn = fn(&ContractBinding, &Arc<ProxyHandle>) -> Option<ContractBinding>;

/// 组件实例在某个契约下的绑定
#[derive(Clone)]
pub struct ContractBinding {
    contract: ContractType,
    instance: Arc<dyn Any + Send + Sync>,
    address: usize,
    wrap: WrapFn,
}

impl ContractBinding {
    /// 以契约对象创建绑定
    pub fn new<C: Contract + ?Sized>(instance: Arc<C>) -> Self {
        Self {
            contract: ContractType::of::<C>(),
            address: instance_address(&instance),
            instance: Arc::new(instance),
            wrap: wrap_binding::<C>,
        }
    }

    /// 契约类型
    pub fn contract(&self) -> ContractType {
        self.contract
    }

    /// 绑定对象的数据地址
    pub fn address(&self) -> usize {
        self.address
    }

    /// 取出契约对象
    pub fn get<C: Contract + ?Sized>(&self) -> Option<Arc<C>> {
        self.instance.downcast_ref::<Arc<C>>().cloned()
    }

    /// 生成经过代理的绑定；契约不支持拦截时返回 `None`
    pub fn wrap(&self, handle: &Arc<ProxyHandle>) -> Option<Self> {
        (self.wrap)(self, handle)
    }
}

impl fmt::Debug for ContractBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractBinding")
            .field("contract", &self.contract.short_name())
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

fn wrap_binding<C: Contract + ?Sized>(
    binding: &ContractBinding,
    handle: &Arc<ProxyHandle>,
) -> Option<ContractBinding> {
    let target = binding.get::<C>()?;
    let proxied = C::intercept(ServiceProxy::new(target, Arc::clone(handle)))?;
    Some(ContractBinding::new(proxied))
}

/// 契约声明收集器
#[derive(Debug, Default)]
pub struct ContractExposer {
    bindings: Vec<ContractBinding>,
}

impl ContractExposer {
    /// 创建空收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明组件满足契约 `C`，重复声明以最后一次为准
    pub fn provide<C: Contract + ?Sized>(&mut self, instance: Arc<C>) -> &mut Self {
        let binding = ContractBinding::new(instance);
        match self
            .bindings
            .iter_mut()
            .find(|existing| existing.contract == binding.contract)
        {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    /// 已声明的契约数量
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 是否没有声明任何契约
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 取出全部绑定
    pub fn into_bindings(self) -> Vec<ContractBinding> {
        self.bindings
    }
}

/// 计算 `Arc` 所指对象的数据地址，胖指针只取数据部分
pub fn instance_address<T: ?Sized>(instance: &Arc<T>) -> usize {
    Arc::as_ptr(instance).cast::<()>() as usize
}
