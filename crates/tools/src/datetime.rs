//! Date/time tool — the current wall-clock time in the configured zone.

use apexclaw_core::tool::{Executor, ToolArgs, ToolDef, ToolHandler};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;

pub struct DateTimeTool {
    offset: FixedOffset,
}

impl DateTimeTool {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "datetime",
            "Get the current date, time and weekday.",
            Executor::Pure(Arc::new(self)),
        )
    }

    fn render(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M:%S %:z (%A)")
            .to_string()
    }
}

#[async_trait]
impl ToolHandler for DateTimeTool {
    async fn call(&self, _args: ToolArgs) -> String {
        self.render(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_in_offset() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let tool = DateTimeTool::new(ist);
        let now = Utc.with_ymd_and_hms(2026, 2, 24, 17, 9, 0).unwrap();
        assert_eq!(tool.render(now), "2026-02-24 22:39:00 +05:30 (Tuesday)");
    }

    #[tokio::test]
    async fn call_returns_a_timestamp() {
        let tool = DateTimeTool::new(FixedOffset::east_opt(0).unwrap());
        let result = tool.call(ToolArgs::new()).await;
        assert!(result.contains("+00:00"));
    }

    #[test]
    fn definition_is_public() {
        let def = DateTimeTool::new(FixedOffset::east_opt(0).unwrap()).definition();
        assert!(!def.secure);
        assert!(def.args.is_empty());
    }
}
