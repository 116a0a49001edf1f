//! 元数据定义
//!
//! 提供组件具体类型与契约类型的标识信息

use std::any::TypeId;
use std::fmt;

/// 类型信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型名称（不含模块路径）
    pub name: &'static str,
    /// 类型ID
    pub id: TypeId,
    /// 完整类型路径
    pub module_path: &'static str,
}

impl TypeInfo {
    /// 从类型获取类型信息，支持 `dyn Trait` 等非定长类型
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            name: short_type_name(full),
            id: TypeId::of::<T>(),
            module_path: full,
        }
    }

    /// 获取简短的类型名称
    pub fn short_name(&self) -> &'static str {
        self.name
    }

    /// 判断是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 截取类型名的最后一段，去掉泛型参数、附加约束与 `dyn` 前缀
pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split(" + ").next().unwrap_or(full);
    let base = base.split('<').next().unwrap_or(base);
    let base = base.trim_start_matches("dyn ");
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {}
    struct EnglishGreeter;

    #[test]
    fn test_short_names() {
        assert_eq!(TypeInfo::of::<EnglishGreeter>().short_name(), "EnglishGreeter");
        assert_eq!(TypeInfo::of::<dyn Greeter>().short_name(), "Greeter");
        assert_eq!(short_type_name("alloc::vec::Vec<core::option::Option<u8>>"), "Vec");
        assert_eq!(TypeInfo::of::<dyn Greeter + Send>().short_name(), "Greeter");
        assert_eq!(short_type_name("dyn app::Greeter + core::marker::Send + core::marker::Sync"), "Greeter");
    }

    #[test]
    fn test_identity_is_by_type_id() {
        let info = TypeInfo::of::<dyn Greeter>();
        assert!(info.is::<dyn Greeter>());
        assert!(!info.is::<EnglishGreeter>());
        assert_eq!(info, TypeInfo::of::<dyn Greeter>());
    }
}
