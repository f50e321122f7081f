use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 关闭信号只发送一次；关闭之后的订阅者会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let guard = match self.shutdown_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        let _ = rx.recv().await;
    }

    /// 触发关闭，重复调用无效果
    pub fn shutdown(&self) {
        let sender = match self.shutdown_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
                let _ = tx.send(());
                info!("关闭信号已发送");
            }
            None => debug!("关闭管理器已经触发过关闭"),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        match self.shutdown_tx.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        manager.shutdown();
        assert!(rx.recv().await.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();

        tokio::time::timeout(Duration::from_secs(1), manager.wait())
            .await
            .expect("late subscriber should not block");
    }
}
