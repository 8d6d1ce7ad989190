//! System prompt assembly for the agent loop.

use crate::tools::CLOSE_TOOL;

/// Default system prompt. `{instruction}`, `{url}` and `{tools}` are substituted.
pub const AGENT_SYSTEM_PROMPT: &str = r#"You are a browser automation agent. You accomplish the user's goal by calling tools against a live web page, one step at a time.

## Goal
{instruction}

## Starting Page
{url}

## Available Tools
{tools}

## Rules
- Use `goto` to open URLs; never type a URL into a search box.
- Use `ariaTree` or `screenshot` when you need to see the page before acting.
- Describe click and type targets precisely, using visible text or labels.
- Use `extract` to read structured data instead of guessing from memory.
- Keep a short explanation of what you are doing alongside each tool call.
"#;

/// Appended to every system prompt, including caller-supplied ones.
pub const COMPLETION_DIRECTIVE: &str = "When the task is finished, or you are certain it cannot be finished, call the `close` tool exactly once. Set `taskComplete` to true only if the goal was achieved, and put a short summary of the outcome in `reasoning`.";

pub fn build_system_prompt(
    instruction: &str,
    custom: Option<&str>,
    tool_names: &[&str],
    start_url: &str,
) -> String {
    match custom.map(str::trim).filter(|prompt| !prompt.is_empty()) {
        Some(custom) => format!("{custom}\n\n{COMPLETION_DIRECTIVE}"),
        None => {
            let tools = tool_names
                .iter()
                .filter(|name| **name != CLOSE_TOOL)
                .map(|name| format!("- {name}"))
                .collect::<Vec<_>>()
                .join("\n");
            let body = AGENT_SYSTEM_PROMPT
                .replace("{instruction}", instruction.trim())
                .replace("{url}", start_url)
                .replace("{tools}", &tools);
            format!("{body}\n{COMPLETION_DIRECTIVE}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_prompt_is_kept_verbatim() {
        let prompt = build_system_prompt("buy milk", Some("You are a shopper."), &["goto"], "x");
        assert!(prompt.starts_with("You are a shopper.\n\n"));
        assert!(prompt.ends_with(COMPLETION_DIRECTIVE));
        assert!(!prompt.contains("buy milk"));
    }

    #[test]
    fn default_prompt_lists_tools_and_goal() {
        let prompt = build_system_prompt(
            "open example.com",
            None,
            &["goto", "click", CLOSE_TOOL],
            "about:blank",
        );
        assert!(prompt.contains("open example.com"));
        assert!(prompt.contains("- goto\n- click"));
        assert!(prompt.contains("about:blank"));
        assert!(prompt.contains("`close`"));
    }
}
