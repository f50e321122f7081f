//! Test helper utilities

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// 轮询等待条件成立，超时返回 false
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }

    /// 固定的测试时间点，避免依赖系统时钟
    pub fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}
