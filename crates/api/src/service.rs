use std::sync::Arc;

use chrono::Utc;
use cronlease_core::{SchedulerError, SchedulerResult};
use cronlease_domain::{
    initial_next_execution, repositories::TaskRepository, NewTask, Task, TaskFilter, TaskStatus,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{CreateTaskRequest, TaskQueryParams, UpdateTaskRequest};

/// 条件更新遇到并发写入时的最大尝试次数
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// 任务管理服务
///
/// 负责任务的增删改查。调度相关字段的推导与校验在这里完成，
/// 租约字段只由调度循环写入。
#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repository: Arc<dyn TaskRepository>) -> Self {
        Self { repository }
    }

    /// 探测任务存储是否可访问
    pub async fn ping(&self) -> SchedulerResult<()> {
        let probe = TaskFilter {
            limit: Some(1),
            ..Default::default()
        };
        self.repository.list(&probe).await.map(|_| ())
    }

    pub async fn list_tasks(&self, params: TaskQueryParams) -> SchedulerResult<Vec<Task>> {
        let filter = TaskFilter {
            status: params.status,
            schedule_type: params.schedule_type,
            name_contains: params.name,
            limit: params.limit,
        };
        self.repository.list(&filter).await
    }

    pub async fn get_task(&self, id: Uuid) -> SchedulerResult<Task> {
        self.repository
            .read_task(id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    pub async fn create_task(&self, request: CreateTaskRequest) -> SchedulerResult<Task> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(SchedulerError::InvalidTaskParams(
                "任务名称不能为空".to_string(),
            ));
        }

        let task = Task::create(
            NewTask {
                name: name.to_string(),
                schedule_type: request.schedule.schedule_type,
                schedule_value: request.schedule.value,
                test_type: request.test_type,
                experiment_type: request.experiment_type,
                notification_emails: request.notification_emails,
            },
            Utc::now(),
        )?;

        let created = self.repository.create(&task).await?;
        info!(
            "创建任务: {} 首次执行时间: {:?}",
            created.entity_description(),
            created.next_execution_date
        );
        Ok(created)
    }

    /// 部分更新任务
    ///
    /// 调度方式变化时重新计算下次执行时间；同时显式给出的
    /// `nextExecutionDate` 优先于计算结果。写入以读取时的状态和
    /// 下次执行时间为条件，调度循环在此期间写入时重新读取并再次应用。
    pub async fn update_task(&self, id: Uuid, request: UpdateTaskRequest) -> SchedulerResult<Task> {
        let mut attempt = 1;
        loop {
            let current = self.get_task(id).await?;
            let observed = current.schedule_snapshot();
            let task = Self::apply_update(current, &request)?;

            match self.repository.update(&task, &observed).await {
                Ok(updated) => {
                    info!("更新任务: {}", updated.entity_description());
                    return Ok(updated);
                }
                Err(SchedulerError::ConcurrentModification { .. })
                    if attempt < MAX_UPDATE_ATTEMPTS =>
                {
                    debug!("任务 {} 在更新期间被修改，重试第 {} 次", id, attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply_update(mut task: Task, request: &UpdateTaskRequest) -> SchedulerResult<Task> {
        if let Some(name) = &request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(SchedulerError::InvalidTaskParams(
                    "任务名称不能为空".to_string(),
                ));
            }
            task.name = name.to_string();
        }
        if let Some(schedule) = &request.schedule {
            let next = initial_next_execution(schedule.schedule_type, &schedule.value, Utc::now())?;
            task.schedule_type = schedule.schedule_type;
            task.schedule_value = schedule.value.clone();
            task.next_execution_date = Some(next);
            // 新的调度配置使失败的任务重新进入调度
            if task.status == TaskStatus::Failed {
                task.status = TaskStatus::Scheduled;
            }
        }
        if let Some(status) = request.status {
            task.status = status;
        }
        if let Some(test_type) = &request.test_type {
            task.test_type = test_type.clone();
        }
        if let Some(experiment_type) = &request.experiment_type {
            task.experiment_type = experiment_type.clone();
        }
        if let Some(emails) = &request.notification_emails {
            task.notification_emails = emails.clone();
        }
        task.next_execution_date = request
            .next_execution_date
            .clone()
            .apply_to(task.next_execution_date);
        Ok(task)
    }

    pub async fn delete_task(&self, id: Uuid) -> SchedulerResult<()> {
        let task = self.get_task(id).await?;
        if task.status == TaskStatus::Executed {
            return Err(SchedulerError::InvalidTaskParams(
                "已执行的任务不能删除".to_string(),
            ));
        }

        if !self.repository.delete(id).await? {
            return Err(SchedulerError::TaskNotFound { id });
        }
        info!("删除任务: {}", task.entity_description());
        Ok(())
    }
}
