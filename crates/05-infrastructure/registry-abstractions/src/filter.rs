//! 过滤表达式模型
//!
//! 过滤表达式是一棵基于组件属性的布尔表达式树：叶子节点比较单个属性，
//! 内部节点以 AND / OR 组合左右子树。每个节点都带有取反标记，取反作用于
//! 整个子树的结果，并且总是在布尔运算之后进行。
//!
//! 默认文本编码为 LDAP 风格：
//!
//! - `Property(n, v)` 编码为 `(n=v)`
//! - 取反编码为 `(!(n=v))`
//! - `And(a, b)` 编码为 `(&AB)`，`Or(a, b)` 编码为 `(|AB)`

use infrastructure_common::{ComponentError, ComponentProperties, ComponentResult};
use std::fmt;
use std::str::FromStr;

/// 过滤表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// 属性相等比较
    Property {
        /// 属性名
        name: String,
        /// 期望值
        value: String,
        /// 是否取反
        negated: bool,
    },
    /// 逻辑与
    And {
        /// 左操作数
        left: Box<Filter>,
        /// 右操作数
        right: Box<Filter>,
        /// 是否取反
        negated: bool,
    },
    /// 逻辑或
    Or {
        /// 左操作数
        left: Box<Filter>,
        /// 右操作数
        right: Box<Filter>,
        /// 是否取反
        negated: bool,
    },
}

impl Filter {
    /// 创建属性比较表达式
    pub fn property(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Property {
            name: name.into(),
            value: value.into(),
            negated: false,
        }
    }

    /// 与另一个表达式组合为逻辑与
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(other),
            negated: false,
        }
    }

    /// 与另一个表达式组合为逻辑或
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(other),
            negated: false,
        }
    }

    /// 对整个表达式取反，再次调用恢复原状
    #[must_use]
    pub fn not(mut self) -> Self {
        match &mut self {
            Self::Property { negated, .. } | Self::And { negated, .. } | Self::Or { negated, .. } => {
                *negated = !*negated;
            }
        }
        self
    }

    /// 是否取反
    pub fn is_negated(&self) -> bool {
        match self {
            Self::Property { negated, .. } | Self::And { negated, .. } | Self::Or { negated, .. } => {
                *negated
            }
        }
    }

    /// 对属性集合求值
    pub fn matches(&self, properties: &ComponentProperties) -> bool {
        let result = match self {
            Self::Property { name, value, .. } => properties
                .get(name)
                .map_or(false, |actual| actual.to_filter_text() == *value),
            Self::And { left, right, .. } => {
                let left = left.matches(properties);
                let right = right.matches(properties);
                left && right
            }
            Self::Or { left, right, .. } => {
                let left = left.matches(properties);
                let right = right.matches(properties);
                left || right
            }
        };
        result != self.is_negated()
    }

    /// 使用默认的 LDAP 风格编码
    pub fn encode(&self) -> String {
        self.encode_with(&LdapFilterEncoding)
    }

    /// 使用指定编码
    pub fn encode_with(&self, encoding: &dyn FilterEncoding) -> String {
        match self {
            Self::Property {
                name,
                value,
                negated,
            } => encoding.property(name, value, *negated),
            Self::And {
                left,
                right,
                negated,
            } => encoding.and(
                &left.encode_with(encoding),
                &right.encode_with(encoding),
                *negated,
            ),
            Self::Or {
                left,
                right,
                negated,
            } => encoding.or(
                &left.encode_with(encoding),
                &right.encode_with(encoding),
                *negated,
            ),
        }
    }

    /// 解析 LDAP 风格的过滤字符串
    pub fn parse(expression: &str) -> ComponentResult<Self> {
        FilterParser::new(expression).parse()
    }
}

/// 输出与 [`Filter::encode`] 相同的编码
///
/// 编码不转义属性值，值中含有 `(`、`)` 或 `\\` 时输出的文本
/// 无法再被 [`Filter::parse`] 读回
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// 等同于 [`Filter::parse`]，属性值中的特殊字符需要以 `\\` 转义
impl FromStr for Filter {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 过滤表达式的文本编码
///
/// 不同的后端提供者可以持久化不同格式的过滤字符串
pub trait FilterEncoding {
    /// 编码属性比较
    fn property(&self, name: &str, value: &str, negated: bool) -> String;

    /// 编码逻辑与，`left`/`right` 为已编码的操作数
    fn and(&self, left: &str, right: &str, negated: bool) -> String;

    /// 编码逻辑或，`left`/`right` 为已编码的操作数
    fn or(&self, left: &str, right: &str, negated: bool) -> String;
}

/// LDAP 风格编码
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapFilterEncoding;

impl LdapFilterEncoding {
    fn negate(body: String, negated: bool) -> String {
        if negated {
            format!("(!{body})")
        } else {
            body
        }
    }
}

impl FilterEncoding for LdapFilterEncoding {
    fn property(&self, name: &str, value: &str, negated: bool) -> String {
        Self::negate(format!("({name}={value})"), negated)
    }

    fn and(&self, left: &str, right: &str, negated: bool) -> String {
        Self::negate(format!("(&{left}{right})"), negated)
    }

    fn or(&self, left: &str, right: &str, negated: bool) -> String {
        Self::negate(format!("(|{left}{right})"), negated)
    }
}

/// LDAP 风格过滤字符串解析器
///
/// 支持 `(!X)`、两个及以上操作数的 `(&...)`/`(|...)`（按从左到右折叠）以及值中的反斜杠转义
struct FilterParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> FilterParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> ComponentResult<Filter> {
        self.skip_whitespace();
        let filter = self.parse_filter()?;
        self.skip_whitespace();
        if self.pos != self.chars.len() {
            return Err(self.error("表达式末尾存在多余字符"));
        }
        Ok(filter)
    }

    fn parse_filter(&mut self) -> ComponentResult<Filter> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                let inner = self.parse_filter()?;
                inner.not()
            }
            Some(op @ ('&' | '|')) => {
                self.pos += 1;
                self.parse_composite(op)?
            }
            Some(_) => self.parse_property()?,
            None => return Err(self.error("表达式意外结束")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_composite(&mut self, op: char) -> ComponentResult<Filter> {
        let mut operands = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('(') {
                operands.push(self.parse_filter()?);
            } else {
                break;
            }
        }

        let mut operands = operands.into_iter();
        let Some(first) = operands.next() else {
            return Err(self.error("组合表达式缺少操作数"));
        };
        Ok(operands.fold(first, |acc, next| {
            if op == '&' {
                acc.and(next)
            } else {
                acc.or(next)
            }
        }))
    }

    fn parse_property(&mut self) -> ComponentResult<Filter> {
        let mut name = String::new();
        loop {
            match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    break;
                }
                Some('(' | ')') | None => return Err(self.error("属性比较缺少 '='")),
                Some(c) => {
                    name.push(c);
                    self.pos += 1;
                }
            }
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(self.error("属性名为空"));
        }

        let mut value = String::new();
        loop {
            match self.peek() {
                Some(')') => break,
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("转义字符后缺少内容")),
                    }
                }
                Some('(') => return Err(self.error("属性值中存在未转义的 '('")),
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("属性值未闭合")),
            }
        }

        Ok(Filter::property(name, value))
    }

    fn expect(&mut self, expected: char) -> ComponentResult<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("期望 '{expected}'")))
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> ComponentError {
        ComponentError::invalid_filter(self.source, format!("位置 {}: {message}", self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(pairs: &[(&str, &str)]) -> ComponentProperties {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_encodings() {
        let and = Filter::property("a", "1").and(Filter::property("b", "2"));
        assert_eq!(and.encode(), "(&(a=1)(b=2))");
        assert_eq!(and.clone().not().encode(), "(!(&(a=1)(b=2)))");

        let or = Filter::property("a", "1").or(Filter::property("b", "2"));
        assert_eq!(or.encode(), "(|(a=1)(b=2))");

        assert_eq!(Filter::property("filter", "value").encode(), "(filter=value)");
        assert_eq!(
            Filter::property("filter", "value").not().encode(),
            "(!(filter=value))"
        );
    }

    #[test]
    fn test_not_toggles() {
        let filter = Filter::property("a", "1");
        assert!(filter.clone().not().is_negated());
        assert_eq!(filter.clone().not().not(), filter);
    }

    #[test]
    fn test_property_match_is_equality() {
        let filter = Filter::property("name", "value");
        assert!(filter.matches(&properties(&[("name", "value")])));
        assert!(!filter.matches(&properties(&[("name", "value2")])));
        assert!(!filter.matches(&properties(&[("name", "val")])));
        assert!(!filter.matches(&properties(&[("other", "value")])));
    }

    #[test]
    fn test_empty_properties_never_match_a_leaf() {
        let empty = ComponentProperties::new();
        assert!(!Filter::property("a", "1").matches(&empty));
        assert!(!Filter::property("a", "1")
            .or(Filter::property("b", "2"))
            .matches(&empty));
        // 取反在叶子求值之后
        assert!(Filter::property("a", "1").not().matches(&empty));
    }

    #[test]
    fn test_negation_applies_after_operator() {
        let only_a = properties(&[("a", "1")]);
        let and = Filter::property("a", "1").and(Filter::property("b", "2"));
        assert!(!and.matches(&only_a));
        assert!(and.clone().not().matches(&only_a));

        let or = Filter::property("a", "1").or(Filter::property("b", "2"));
        assert!(or.matches(&only_a));
        assert!(!or.not().matches(&only_a));
    }

    #[test]
    fn test_integer_properties_compare_by_text() {
        let props = ComponentProperties::new().with("component.priority", 4);
        assert!(Filter::property("component.priority", "4").matches(&props));
    }

    #[test]
    fn test_parse_round_trips_encoded_filters() {
        for text in [
            "(a=1)",
            "(!(a=1))",
            "(&(a=1)(b=2))",
            "(!(&(a=1)(b=2)))",
            "(|(a=1)(!(b=2)))",
        ] {
            let filter: Filter = text.parse().unwrap();
            assert_eq!(filter.encode(), text);
        }
    }

    #[test]
    fn test_parse_folds_many_operands_and_whitespace() {
        let filter = Filter::parse(" (& (a=1) (b=2) (c=3) ) ").unwrap();
        assert_eq!(filter.encode(), "(&(&(a=1)(b=2))(c=3))");
        assert!(filter.matches(&properties(&[("a", "1"), ("b", "2"), ("c", "3")])));
    }

    #[test]
    fn test_parse_escaped_value() {
        let filter = Filter::parse(r"(name=a\)b)").unwrap();
        assert!(filter.matches(&properties(&[("name", "a)b")])));
    }

    #[test]
    fn test_display_does_not_escape_values() {
        let filter = Filter::property("name", "a)b");
        assert_eq!(filter.to_string(), "(name=a)b)");
        assert!(filter.to_string().parse::<Filter>().is_err());

        let plain = Filter::property("name", "a*b").not();
        assert_eq!(plain.to_string().parse::<Filter>().unwrap(), plain);
    }

    #[test]
    fn test_parse_errors() {
        for text in ["", "a=1", "(a=1", "(=1)", "(&)", "(a=1)(b=2)", "(a1)"] {
            let error = Filter::parse(text).unwrap_err();
            assert!(matches!(error, ComponentError::InvalidFilter { .. }), "{text}");
        }
    }

    struct SqlEncoding;

    impl FilterEncoding for SqlEncoding {
        fn property(&self, name: &str, value: &str, negated: bool) -> String {
            let op = if negated { "<>" } else { "=" };
            format!("{name} {op} '{value}'")
        }

        fn and(&self, left: &str, right: &str, negated: bool) -> String {
            let body = format!("({left} AND {right})");
            if negated { format!("NOT {body}") } else { body }
        }

        fn or(&self, left: &str, right: &str, negated: bool) -> String {
            let body = format!("({left} OR {right})");
            if negated { format!("NOT {body}") } else { body }
        }
    }

    #[test]
    fn test_pluggable_encoding() {
        let filter = Filter::property("a", "1").and(Filter::property("b", "2").not());
        assert_eq!(filter.encode_with(&SqlEncoding), "(a = '1' AND b <> '2')");
    }
}
