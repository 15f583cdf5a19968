//! 人工确认：恢复旧任务、接受计划

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

use async_trait::async_trait;

/// 向操作员提问 y/n；只有 `y`（不区分大小写）算同意
#[async_trait]
pub trait Operator: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// 从 stdin 读取回答
#[derive(Debug, Default)]
pub struct StdinOperator;

#[async_trait]
impl Operator for StdinOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            print!("\n{prompt} (y/n): ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_yes(&line),
            _ => false,
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// 预置回答的操作员（测试、非交互运行）；回答用完后一律拒绝
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的提问
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" Y "));
        assert!(!is_yes("yes"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
    }

    #[tokio::test]
    async fn test_scripted_operator() {
        let op = ScriptedOperator::new([true]);
        assert!(op.confirm("Resume?").await);
        assert!(!op.confirm("Proceed?").await);
        assert_eq!(op.prompts(), vec!["Resume?", "Proceed?"]);
    }
}
