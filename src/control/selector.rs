use crate::error::{RelayError, Result};
use regex::Regex;
use std::fmt;

/// 命令的目标选择器
///
/// 字面量 `all` 匹配全部对象；其他文本作为正则表达式，要求与名称整体匹配
#[derive(Clone)]
pub enum Selector {
    All,
    Pattern(Regex),
}

impl Selector {
    pub fn parse(text: &str) -> Result<Self> {
        if text == "all" {
            return Ok(Selector::All);
        }
        let anchored = format!("^(?:{})$", text);
        Regex::new(&anchored)
            .map(Selector::Pattern)
            .map_err(|source| RelayError::InvalidPattern {
                pattern: text.to_string(),
                source,
            })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Pattern(re) => re.is_match(name),
        }
    }

    /// 保留 `items` 中名称匹配的元素
    pub fn filter<T>(&self, items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
        items.into_iter().filter(|item| self.matches(name(item))).collect()
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "Selector::All"),
            Selector::Pattern(re) => write!(f, "Selector::Pattern({})", re.as_str()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "all"),
            Selector::Pattern(re) => {
                let pattern = re.as_str();
                let inner = pattern
                    .strip_prefix("^(?:")
                    .and_then(|p| p.strip_suffix(")$"))
                    .unwrap_or(pattern);
                write!(f, "{}", inner)
            }
        }
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Selector::All, Selector::All) => true,
            (Selector::Pattern(a), Selector::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}
