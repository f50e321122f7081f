//! SQLite 行与领域对象之间的字段转换
//!
//! 时间以 UTC 毫秒时间戳存储，JSON 字段以文本存储。

use chrono::{DateTime, TimeZone, Utc};
use cronlease_core::{SchedulerError, SchedulerResult};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn to_millis(value: DateTime<Utc>) -> i64 {
        value.timestamp_millis()
    }

    pub fn to_millis_opt(value: Option<DateTime<Utc>>) -> Option<i64> {
        value.map(Self::to_millis)
    }

    pub fn from_millis(millis: i64) -> SchedulerResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| SchedulerError::Serialization(format!("无效的时间戳: {millis}")))
    }

    pub fn parse_instant(row: &SqliteRow, field_name: &str) -> SchedulerResult<DateTime<Utc>> {
        let millis: i64 = row.try_get(field_name)?;
        Self::from_millis(millis)
    }

    pub fn parse_optional_instant(
        row: &SqliteRow,
        field_name: &str,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        row.try_get::<Option<i64>, _>(field_name)?
            .map(Self::from_millis)
            .transpose()
    }

    pub fn parse_json(row: &SqliteRow, field_name: &str) -> SchedulerResult<serde_json::Value> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str)
            .map_err(|e| SchedulerError::Serialization(format!("解析字段{field_name}失败: {e}")))
    }

    pub fn parse_emails(row: &SqliteRow, field_name: &str) -> SchedulerResult<Vec<String>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) => serde_json::from_str(&json_str).map_err(|e| {
                SchedulerError::Serialization(format!("解析通知邮箱失败: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }
}
