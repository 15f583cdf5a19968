//! 解析 LLM 文本回复：编号计划与夹在散文/Markdown 中的 JSON 对象

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::core::AgentError;

static NUMBERED_LINE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static JSON_OBJECT_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 提取所有 `N. 描述` 行的描述部分（去首尾空白，丢弃空项）
pub fn parse_numbered_plan(text: &str) -> Vec<String> {
    let Some(re) = NUMBERED_LINE_RE
        .get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s*(.*)").ok())
        .as_ref()
    else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 取第一个 `{` 到最后一个 `}` 的片段；没有时原样返回
pub fn extract_json_object(text: &str) -> &str {
    JSON_OBJECT_RE
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// extract_json_object + serde_json 反序列化
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    serde_json::from_str(extract_json_object(text))
        .map_err(|e| AgentError::JsonParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pick {
        tool_name: String,
        tool_input: String,
    }

    #[test]
    fn test_parse_numbered_plan() {
        let text = "Here is the plan:\n1. Scan example.com for open web ports.\n  2.  Retrieve the homepage.  \n3.\nNotes: none";
        // `3.` 后的 \s* 跨行吞掉换行，捕获下一行
        assert_eq!(
            parse_numbered_plan(text),
            vec![
                "Scan example.com for open web ports.",
                "Retrieve the homepage.",
                "Notes: none"
            ]
        );
    }

    #[test]
    fn test_parse_numbered_plan_without_list() {
        assert!(parse_numbered_plan("I cannot help with that.").is_empty());
    }

    #[test]
    fn test_extract_json_from_markdown() {
        let text = "Sure!\n```json\n{\"tool_name\": \"nmap_scan\",\n \"tool_input\": \"a.com\"}\n```";
        let pick: Pick = parse_json_reply(text).unwrap();
        assert_eq!(
            pick,
            Pick {
                tool_name: "nmap_scan".into(),
                tool_input: "a.com".into()
            }
        );
    }

    #[test]
    fn test_extract_without_braces_returns_input() {
        assert_eq!(extract_json_object("no json here"), "no json here");
        assert!(matches!(
            parse_json_reply::<Pick>("no json here"),
            Err(AgentError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        assert!(parse_json_reply::<Pick>(r#"{"tool_name": "x"}"#).is_err());
    }
}
