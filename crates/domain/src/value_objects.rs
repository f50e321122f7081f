//! 值对象
//!
//! `UpdateValue` 区分"设置为某值"、"置空"和"不修改"三种更新操作，
//! 供状态写入和 PATCH 请求共同使用。

use serde::{Deserialize, Deserializer, Serialize};

/// 精确的字段更新操作
///
/// - `Set(T)`: 将字段设置为指定值
/// - `Unset`: 将可空字段置为 null
/// - `NoChange`: 不修改该字段
///
/// 反序列化时字段缺失为 `NoChange`（需配合 `#[serde(default)]`），
/// 显式的 `null` 为 `Unset`，其余为 `Set`。
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum UpdateValue<T> {
    Set(T),
    Unset,
    #[default]
    NoChange,
}

impl<T> UpdateValue<T> {
    /// 由可空值构造：`Some` 为设置，`None` 为置空
    pub fn from_nullable(value: Option<T>) -> Self {
        match value {
            Some(v) => UpdateValue::Set(v),
            None => UpdateValue::Unset,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, UpdateValue::NoChange)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, UpdateValue::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            UpdateValue::Set(value) => Some(value),
            _ => None,
        }
    }

    /// 应用到已有的可空值上
    pub fn apply_to(self, existing: Option<T>) -> Option<T> {
        match self {
            UpdateValue::Set(value) => Some(value),
            UpdateValue::Unset => None,
            UpdateValue::NoChange => existing,
        }
    }

    pub fn map<U, F>(self, f: F) -> UpdateValue<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            UpdateValue::Set(value) => UpdateValue::Set(f(value)),
            UpdateValue::Unset => UpdateValue::Unset,
            UpdateValue::NoChange => UpdateValue::NoChange,
        }
    }
}

impl<'de, T> Deserialize<'de> for UpdateValue<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(UpdateValue::from_nullable(Option::<T>::deserialize(
            deserializer,
        )?))
    }
}
