//! 沙箱 HTTP 服务：`POST /execute` 把一条命令交给一次性环境执行
//!
//! 每个请求在独立任务里执行，客户端断开不会打断实例销毁。

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::sandbox::{CommandExecutor, ExecuteRequest, ExecutionOutput};

/// 服务状态：共享执行器 + 进程级关闭令牌
pub struct SandboxServerState {
    pub executor: Arc<dyn CommandExecutor>,
    pub shutdown: CancellationToken,
}

pub fn create_router(state: Arc<SandboxServerState>) -> Router {
    Router::new()
        .route("/execute", post(execute_handler))
        .route("/health", axum::routing::get(|| async { "OK" }))
        .with_state(state)
}

/// POST /execute
async fn execute_handler(
    State(state): State<Arc<SandboxServerState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionOutput>, (StatusCode, Json<Value>)> {
    tracing::info!("Received execution request: {}", request.command);

    let executor = Arc::clone(&state.executor);
    let cancel = state.shutdown.child_token();
    let task = tokio::spawn(async move { executor.execute(&request.command, &cancel).await });

    let result = match task.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("execution task aborted: {e}")),
    };

    match result {
        Ok(output) => Ok(Json(output)),
        Err(e) => {
            tracing::error!("Command execution failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": format!("Command execution failed on server: {e}") })),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxError;
    use async_trait::async_trait;

    struct FixedExecutor(Result<ExecutionOutput, String>);

    #[async_trait]
    impl CommandExecutor for FixedExecutor {
        async fn execute(
            &self,
            _command: &str,
            _cancel: &CancellationToken,
        ) -> Result<ExecutionOutput, SandboxError> {
            self.0.clone().map_err(SandboxError::Command)
        }
    }

    fn state(result: Result<ExecutionOutput, String>) -> Arc<SandboxServerState> {
        Arc::new(SandboxServerState {
            executor: Arc::new(FixedExecutor(result)),
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let out = ExecutionOutput {
            filename: "ping_-c_4_host_abcdef.txt".into(),
            file_content: "4 packets transmitted".into(),
        };
        let Json(body) = execute_handler(
            State(state(Ok(out.clone()))),
            Json(ExecuteRequest {
                command: "ping -c 4 host".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body, out);
    }

    #[tokio::test]
    async fn test_execute_failure_is_500_with_detail() {
        let (status, Json(body)) = execute_handler(
            State(state(Err("boom".into()))),
            Json(ExecuteRequest {
                command: "whois x".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["detail"],
            "Command execution failed on server: Remote command failed: boom"
        );
    }
}
