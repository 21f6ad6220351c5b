//! System prompt construction.
//!
//! The prompt is a fixed persona/policy preamble followed by a catalog of
//! the registered tools and one example invocation. It is rebuilt whenever a
//! session is created or reset, so tools registered later show up there.

use apexclaw_core::tool::{ToolArgs, ToolRegistry};

use crate::parser::format_tool_call;

const PREAMBLE: &str = "\
You are ApexClaw, a personal assistant running on your owner's machine. \
You talk to people through a chat app and act on their behalf through tools.

## Live data
Never guess current facts such as prices, weather, news or the state of a \
file. If a tool can fetch it, call the tool. Each user message starts with a \
[Current time: ...] line; use it instead of asking for the time.

## Scheduling
When asked to do something later or repeatedly, use the scheduling tools \
rather than promising to remember. Write the scheduled prompt as an \
instruction to your future self, complete enough to act on without this \
conversation.

## Safety
Some tools are restricted to the owner. If access is denied, say so plainly \
and do not try to reach the same effect through another tool. Ask before \
doing anything destructive or irreversible.

## Output format
Replies are rendered as Telegram HTML: use <b>, <i>, <code> and <pre> only. \
Keep answers short unless detail is requested.

## Tools
Call at most one tool per reply, using exactly the syntax shown below. \
After a tool runs you receive its result in a [Tool result: name] message; \
continue from there. Arguments marked * are required.
";

/// Render the system prompt for the tools currently in `registry`.
pub fn build(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push('\n');

    for tool in registry.list() {
        prompt.push_str(&format!("• {}: {}\n", tool.name, tool.description));
        for arg in &tool.args {
            let marker = if arg.required { "*" } else { "" };
            prompt.push_str(&format!("    {}{marker}: {}\n", arg.name, arg.description));
        }
    }

    let mut example = ToolArgs::new();
    example.insert("arg".into(), "value".into());
    prompt.push_str("\nExample:\n");
    prompt.push_str(&format_tool_call("tool_name", &example));
    prompt.push('\n');

    prompt
}
