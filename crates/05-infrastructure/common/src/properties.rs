//! 组件属性
//!
//! 注册时附加在组件上的键值属性，过滤表达式基于这些属性求值

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 优先级属性键
pub const PRIORITY_PROPERTY: &str = "component.priority";

/// 代理标记属性键，存在且为 true 表示该发布是拦截代理
pub const PROXY_PROPERTY: &str = "component.proxy";

/// 注册表标识属性键，记录发布该条目的注册表实例
pub const REGISTRY_PROPERTY: &str = "component.registry";

/// 判断属性键是否为保留键
pub fn is_reserved_property(key: &str) -> bool {
    matches!(key, PRIORITY_PROPERTY | PROXY_PROPERTY | REGISTRY_PROPERTY)
}

/// 属性值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// 布尔值
    Bool(bool),
    /// 整数
    Integer(i64),
    /// 文本
    Text(String),
}

impl PropertyValue {
    /// 以整数读取，文本形式的整数同样可以读取
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// 以布尔值读取
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Integer(_) => None,
        }
    }

    /// 过滤表达式比较时使用的文本形式
    pub fn to_filter_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// 组件属性集合
///
/// 按键排序，保证编码与遍历顺序稳定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentProperties {
    entries: BTreeMap<String, PropertyValue>,
}

impl ComponentProperties {
    /// 创建空属性集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加属性（构建器风格）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入属性，返回被替换的旧值
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// 移除属性
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    /// 获取属性
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// 以整数读取属性
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_integer)
    }

    /// 以布尔值读取属性
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropertyValue::as_bool)
    }

    /// 以文本读取属性
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(PropertyValue::to_filter_text)
    }

    /// 是否包含指定键
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 属性数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 遍历属性
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// 合并另一组属性，同名键以对方为准
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// 去掉保留键后的副本
    pub fn without_reserved(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(key, _)| !is_reserved_property(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    /// 是否带有代理标记
    pub fn is_proxy(&self) -> bool {
        self.get_bool(PROXY_PROPERTY).unwrap_or(false)
    }

    /// 读取优先级属性
    pub fn priority(&self) -> Option<i32> {
        self.get_integer(PRIORITY_PROPERTY)
            .and_then(|value| i32::try_from(value).ok())
    }
}

impl<K, V> FromIterator<(K, V)> for ComponentProperties
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_text_of_each_value_kind() {
        assert_eq!(PropertyValue::from("value").to_filter_text(), "value");
        assert_eq!(PropertyValue::from(4).to_filter_text(), "4");
        assert_eq!(PropertyValue::from(true).to_filter_text(), "true");
    }

    #[test]
    fn test_priority_and_proxy_markers() {
        let properties = ComponentProperties::new()
            .with(PRIORITY_PROPERTY, 3)
            .with(PROXY_PROPERTY, true)
            .with("filter", "value");

        assert_eq!(properties.priority(), Some(3));
        assert!(properties.is_proxy());

        let plain = properties.without_reserved();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain.get_text("filter").as_deref(), Some("value"));
        assert!(!plain.is_proxy());
    }

    #[test]
    fn test_text_values_parse_as_integer_and_bool() {
        let properties: ComponentProperties =
            [(PRIORITY_PROPERTY, "7"), (PROXY_PROPERTY, "true")].into_iter().collect();
        assert_eq!(properties.priority(), Some(7));
        assert!(properties.is_proxy());
    }

    #[test]
    fn test_merge_overrides_existing_keys() {
        let mut base = ComponentProperties::new().with("a", "1").with("b", "2");
        base.merge(&ComponentProperties::new().with("b", "3"));
        assert_eq!(base.get_text("b").as_deref(), Some("3"));
        assert_eq!(base.len(), 2);
    }
}
