//! 调度周期计算
//!
//! 标准五字段 CRON 表达式（分 时 日 月 周）会被转换为 `cron` crate 的
//! 秒级六字段语法；星期字段按标准编号（0 或 7 表示周日）解释。
//! 六字段或七字段表达式按 `cron` crate 的原生语法处理。

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::debug;

use cronlease_core::{SchedulerError, SchedulerResult};

use crate::entities::ScheduleType;

/// CRON表达式解析和调度工具
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_expression(cron_expr)
            .map_err(|message| SchedulerError::invalid_schedule(cron_expr, message))?;
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| SchedulerError::invalid_schedule(cron_expr, e.to_string()))?;

        if normalized != cron_expr.trim() {
            debug!("CRON表达式已转换: {} -> {}", cron_expr, normalized);
        }

        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取严格晚于参考时间的下一次执行时间
    pub fn next_after(&self, reference: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        self.schedule
            .after(&reference)
            .find(|t| *t > reference)
            .ok_or_else(|| {
                SchedulerError::invalid_schedule(&self.expression, "表达式不会再次触发")
            })
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming(&self, reference: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&reference)
            .filter(|t| *t > reference)
            .take(count)
            .collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 计算CRON表达式在参考时间之后的下一次执行时间
pub fn next_execution(cron_expr: &str, reference: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
    CronScheduler::new(cron_expr)?.next_after(reference)
}

/// 创建任务时推导首次执行时间
pub fn initial_next_execution(
    schedule_type: ScheduleType,
    schedule_value: &str,
    now: DateTime<Utc>,
) -> SchedulerResult<DateTime<Utc>> {
    match schedule_type {
        ScheduleType::OneTime => DateTime::parse_from_rfc3339(schedule_value.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                SchedulerError::invalid_schedule(schedule_value, format!("无效的执行时间: {e}"))
            }),
        ScheduleType::Recurring => next_execution(schedule_value, now),
    }
}

/// 校验调度配置，不计算执行时间
pub fn validate_schedule(schedule_type: ScheduleType, schedule_value: &str) -> SchedulerResult<()> {
    match schedule_type {
        ScheduleType::OneTime => DateTime::parse_from_rfc3339(schedule_value.trim())
            .map(|_| ())
            .map_err(|e| {
                SchedulerError::invalid_schedule(schedule_value, format!("无效的执行时间: {e}"))
            }),
        ScheduleType::Recurring => CronScheduler::validate(schedule_value),
    }
}

fn normalize_expression(expr: &str) -> Result<String, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let day_of_week = normalize_day_of_week(fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(format!("需要5个字段，实际为{n}个")),
    }
}

/// 将标准星期编号（0-7，0和7为周日）展开为 `cron` crate 的编号（1-7，1为周日）
fn normalize_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("无效的星期步长: {item}"))?;
                if step == 0 {
                    return Err(format!("星期步长不能为0: {item}"));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_day(a)?, parse_day(b)?)
        } else {
            let day = parse_day(range)?;
            if step.is_some() {
                (day, 7)
            } else {
                (day, day)
            }
        };

        if start > end {
            return Err(format!("无效的星期范围: {item}"));
        }

        for day in (start..=end).step_by(step.unwrap_or(1) as usize) {
            days.insert(day % 7);
        }
    }

    Ok(days
        .iter()
        .map(|d| (d + 1).to_string())
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_day(value: &str) -> Result<u32, String> {
    let day: u32 = value
        .parse()
        .map_err(|_| format!("无效的星期值: {value}"))?;
    if day > 7 {
        return Err(format!("星期值超出范围: {day}"));
    }
    Ok(day)
}
