//! Tool definitions and the tool registry.
//!
//! Tools are what give the agent the ability to act in the world. A tool is
//! described to the model in the system prompt and invoked by the model
//! emitting a `<tool_call>` span; the agent loop then looks the tool up here
//! and runs its executor.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Tool arguments as decoded from the model's `key="value"` attributes.
pub type ToolArgs = BTreeMap<String, String>;

/// One documented argument of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolArg {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// A tool that only needs its arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> String;
}

/// A tool that also needs to know who is calling it (to read the caller's
/// `ContextMap`, route progress updates, and so on).
#[async_trait]
pub trait ContextualToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String;
}

/// How a tool is executed. Exactly one variant is invoked per call.
#[derive(Clone)]
pub enum Executor {
    Pure(Arc<dyn ToolHandler>),
    Contextual(Arc<dyn ContextualToolHandler>),
}

impl Executor {
    /// Wrap an async closure taking only the arguments.
    pub fn pure_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        Executor::Pure(Arc::new(PureFn(f)))
    }

    /// Wrap an async closure taking the arguments and the sender id.
    pub fn contextual_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolArgs, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        Executor::Contextual(Arc::new(ContextualFn(f)))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Pure(_) => f.write_str("Executor::Pure"),
            Executor::Contextual(_) => f.write_str("Executor::Contextual"),
        }
    }
}

struct PureFn<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for PureFn<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = String> + Send,
{
    async fn call(&self, args: ToolArgs) -> String {
        (self.0)(args).await
    }
}

struct ContextualFn<F>(F);

#[async_trait]
impl<F, Fut> ContextualToolHandler for ContextualFn<F>
where
    F: Fn(ToolArgs, String) -> Fut + Send + Sync,
    Fut: Future<Output = String> + Send,
{
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String {
        (self.0)(args, sender_id.to_string()).await
    }
}

/// A registered tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    /// Unique name within a registry
    pub name: String,

    /// What the tool does (shown to the model)
    pub description: String,

    /// Documented arguments, in catalog order
    pub args: Vec<ToolArg>,

    /// Only the configured owner may run this tool
    pub secure: bool,

    /// The tool may outlive the caller's deadline; the loop renews an
    /// expired deadline after it runs
    pub blocks_context: bool,

    pub executor: Executor,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, executor: Executor) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
            secure: false,
            blocks_context: false,
            executor,
        }
    }

    /// Add a required argument.
    pub fn arg(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.args.push(ToolArg {
            name: name.into(),
            description: description.into(),
            required: true,
        });
        self
    }

    /// Add an optional argument.
    pub fn optional_arg(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.args.push(ToolArg {
            name: name.into(),
            description: description.into(),
            required: false,
        });
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_blocks_context(mut self, blocks_context: bool) -> Self {
        self.blocks_context = blocks_context;
        self
    }

    /// Run the tool. Contextual executors receive the caller's sender id.
    pub async fn execute(&self, args: ToolArgs, sender_id: &str) -> String {
        match &self.executor {
            Executor::Pure(handler) => handler.call(args).await,
            Executor::Contextual(handler) => handler.call(args, sender_id).await,
        }
    }
}

/// A thread-safe registry of available tools.
///
/// Reads may run concurrently; registration takes the write lock.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolDef>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&self, tool: ToolDef) {
        let name = tool.name.clone();
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<ToolDef>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All registered tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<ToolDef>> {
        let mut tools: Vec<_> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
